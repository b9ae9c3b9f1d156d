use std::path::Path;

/// 把脚本在本机的路径转换成解释器可识别的形式
pub trait PathAdapter: Send + Sync {
    fn adapt(&self, path: &Path) -> String;
}

/// 原样传递路径
#[derive(Debug, Default, Clone, Copy)]
pub struct NativePath;

impl PathAdapter for NativePath {
    fn adapt(&self, path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }
}

/// Windows 路径转换为 WSL 挂载路径，如 `C:\tmp\a.sh` → `/mnt/c/tmp/a.sh`
///
/// 不带盘符的路径只替换分隔符。
#[derive(Debug, Default, Clone, Copy)]
pub struct WslPath;

impl PathAdapter for WslPath {
    fn adapt(&self, path: &Path) -> String {
        let raw = path.to_string_lossy();
        let mut chars = raw.chars();
        match (chars.next(), chars.next()) {
            (Some(drive), Some(':')) if drive.is_ascii_alphabetic() => {
                let rest = raw[2..].replace('\\', "/");
                let rest = rest.trim_start_matches('/');
                format!("/mnt/{}/{}", drive.to_ascii_lowercase(), rest)
            }
            _ => raw.replace('\\', "/"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_path_unchanged() {
        assert_eq!(NativePath.adapt(Path::new("/tmp/job.sh")), "/tmp/job.sh");
    }

    #[test]
    fn test_wsl_path_translation() {
        assert_eq!(
            WslPath.adapt(Path::new("C:\\Users\\dev\\job.sh")),
            "/mnt/c/Users/dev/job.sh"
        );
        assert_eq!(WslPath.adapt(Path::new("D:/data/run.sh")), "/mnt/d/data/run.sh");
        assert_eq!(WslPath.adapt(Path::new("/tmp/job.sh")), "/tmp/job.sh");
    }
}
