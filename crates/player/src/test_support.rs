//! Stand-in executables for subprocess tests.

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

/// A shell script that records its argv, one argument per line, and
/// prints a fixed stdout.
pub struct StubProgram {
    dir: PathBuf,
}

impl StubProgram {
    pub fn new(name: &str, stdout: &str) -> Self {
        let dir = std::env::temp_dir().join(format!("shanty-stub-{}-{name}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let script = format!(
            "#!/bin/sh\nprintf '%s\\n' \"$@\" > '{argv}'\ncat <<'OUT'\n{stdout}\nOUT\n",
            argv = dir.join("argv").display(),
        );
        let program = dir.join("program");
        std::fs::write(&program, script).unwrap();
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();
        Self { dir }
    }

    pub fn path(&self) -> String {
        self.dir.join("program").to_string_lossy().into_owned()
    }

    /// The arguments of the last run.
    pub fn argv(&self) -> Vec<String> {
        std::fs::read_to_string(self.dir.join("argv"))
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl Drop for StubProgram {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}
