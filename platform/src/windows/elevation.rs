use diskforge_core::ForgeError;
use std::env;
use std::os::windows::process::CommandExt;
use std::process::Command;

/// Whether the current process token is elevated.
pub fn is_elevated() -> bool {
    use windows::Win32::Foundation::CloseHandle;
    use windows::Win32::Security::{
        GetTokenInformation, TokenElevation, TOKEN_ELEVATION, TOKEN_QUERY,
    };
    use windows::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

    unsafe {
        let process = GetCurrentProcess();
        let mut token_handle = windows::Win32::Foundation::HANDLE::default();

        if OpenProcessToken(process, TOKEN_QUERY, &mut token_handle).is_err() {
            return false;
        }

        let mut elevation = TOKEN_ELEVATION { TokenIsElevated: 0 };
        let mut return_length = 0u32;

        let result = GetTokenInformation(
            token_handle,
            TokenElevation,
            Some(&mut elevation as *mut _ as *mut _),
            std::mem::size_of::<TOKEN_ELEVATION>() as u32,
            &mut return_length,
        );

        let _ = CloseHandle(token_handle);

        result.is_ok() && elevation.TokenIsElevated != 0
    }
}

/// Re-spawns the current executable with the original arguments and a UAC
/// elevation request. Returns `Ok(true)` when the elevated process was
/// launched, `Ok(false)` when the user declined the prompt.
pub fn relaunch_elevated() -> Result<bool, ForgeError> {
    let current_exe = env::current_exe()?;
    let args: Vec<String> = env::args().skip(1).collect();
    let arg_list = if args.is_empty() {
        String::new()
    } else {
        let quoted: Vec<String> = args.iter().map(|a| format!("'{}'", a.replace('\'', "''"))).collect();
        format!(" -ArgumentList {}", quoted.join(","))
    };

    let status = Command::new("powershell")
        .args([
            "-NoProfile",
            "-Command",
            &format!(
                "Start-Process '{}'{} -Verb RunAs",
                current_exe.display(),
                arg_list
            ),
        ])
        .creation_flags(0x08000000) // CREATE_NO_WINDOW
        .status()?;

    // A declined UAC prompt surfaces as a non-zero Start-Process exit.
    Ok(status.success())
}
