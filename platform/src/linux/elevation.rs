/// Whether the process runs as root. Linux has no UAC-style relaunch; an
/// unprivileged caller is told to rerun under sudo instead.
pub fn is_elevated() -> bool {
    nix::unistd::geteuid().is_root()
}
