//! On-disk layout of a local instance and of the shared distribution area.

use std::path::{Path, PathBuf};

/// Directory holding one local instance (`<unpack_dir>/<id>`).
pub fn instance_dir(unpack_dir: &Path, instance_id: &str) -> PathBuf {
    unpack_dir.join(instance_id)
}

pub fn instance_lock_dir(instance_dir: &Path) -> PathBuf {
    instance_dir.join("lock")
}

/// Exists once the quickstart has been unpacked into the instance directory.
pub fn create_lock_path(instance_dir: &Path) -> PathBuf {
    instance_lock_dir(instance_dir).join("create.yml")
}

/// Holds the tuple the instance was last started with.
pub fn up_lock_path(instance_dir: &Path) -> PathBuf {
    instance_lock_dir(instance_dir).join("up.yml")
}

pub fn quickstart_dir(instance_dir: &Path) -> PathBuf {
    instance_dir.join("crx-quickstart")
}

pub fn pid_file_path(instance_dir: &Path) -> PathBuf {
    quickstart_dir(instance_dir).join("conf").join("cq.pid")
}

/// Path of a control script (`start`, `stop`, `status`).
pub fn control_script_path(instance_dir: &Path, name: &str) -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        quickstart_dir(instance_dir)
            .join("bin")
            .join(format!("{name}.bat"))
    }

    #[cfg(not(target_os = "windows"))]
    {
        quickstart_dir(instance_dir).join("bin").join(name)
    }
}

/// Shared area next to the instances where SDK distributions get extracted.
pub fn dist_dir(unpack_dir: &Path) -> PathBuf {
    unpack_dir
        .parent()
        .map(|parent| parent.join("dist"))
        .unwrap_or_else(|| PathBuf::from("dist"))
}

pub fn sdk_dir(unpack_dir: &Path) -> PathBuf {
    dist_dir(unpack_dir).join("sdk")
}

pub fn sdk_lock_path(unpack_dir: &Path) -> PathBuf {
    dist_dir(unpack_dir).join("lock").join("sdk.yml")
}

/// Get the Java executable inside a JDK home.
pub fn java_exe_path(java_home: &Path) -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        java_home.join("bin").join("java.exe")
    }

    #[cfg(not(target_os = "windows"))]
    {
        java_home.join("bin").join("java")
    }
}
