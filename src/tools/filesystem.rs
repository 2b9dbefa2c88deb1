//! 沙箱文件系统：路径解析与越界校验
//!
//! SafeFs 绑定一个已规范化的根目录。所有工具参数中的路径都先经 resolve：
//! 绝对路径原样使用，相对路径拼到根下；最深的已存在祖先做 canonicalize（解析符号链接），
//! 其余不存在的分量按字面处理（`.` 忽略，`..` 回退一级），最后要求结果以根为前缀。
//! 不论输入是绝对路径、符号链接还是 `../` 序列，都不可能落到根之外。

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use crate::core::AgentError;

/// 符号链接跟随的最大层数（与内核 ELOOP 的量级一致）
const MAX_SYMLINK_DEPTH: usize = 40;

/// 路径越出沙箱根
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("path is outside allowed directory")]
pub struct OutsideRoot;

/// 沙箱文件系统：只负责「这个路径能不能碰」，不做任何 IO 写操作
#[derive(Debug, Clone)]
pub struct SafeFs {
    root_dir: PathBuf,
}

impl SafeFs {
    /// 根目录必须存在且为目录；这是执行器唯一的致命错误来源
    pub fn new(root_dir: impl AsRef<Path>) -> Result<Self, AgentError> {
        let root = root_dir.as_ref();
        let root_dir = root.canonicalize().map_err(|e| AgentError::Workspace {
            path: root.to_path_buf(),
            reason: e.to_string(),
        })?;
        if !root_dir.is_dir() {
            return Err(AgentError::Workspace {
                path: root.to_path_buf(),
                reason: "not a directory".to_string(),
            });
        }
        Ok(Self { root_dir })
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// 解析并校验路径，返回沙箱内的绝对路径
    pub fn resolve(&self, path: &str) -> Result<PathBuf, OutsideRoot> {
        let raw = Path::new(path);
        let candidate = if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            self.root_dir.join(raw)
        };
        let resolved = canonicalize_lenient(&candidate, 0).ok_or(OutsideRoot)?;
        if resolved.starts_with(&self.root_dir) {
            Ok(resolved)
        } else {
            Err(OutsideRoot)
        }
    }

    /// 路径相对根的表示（`/` 分隔），用于 glob 结果
    pub fn relative(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root_dir).ok()?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }
}

/// 对可能不存在的路径做「尽量」规范化；符号链接层数过多时返回 None
fn canonicalize_lenient(path: &Path, depth: usize) -> Option<PathBuf> {
    if depth > MAX_SYMLINK_DEPTH {
        return None;
    }
    let comps: Vec<Component> = path.components().collect();
    for split in (1..=comps.len()).rev() {
        let prefix: PathBuf = comps[..split].iter().collect();
        let Ok(base) = prefix.canonicalize() else {
            continue;
        };
        let mut out = base;
        for c in &comps[split..] {
            match c {
                Component::CurDir => {}
                Component::ParentDir => {
                    out.pop();
                }
                Component::Normal(name) => {
                    out.push(name);
                    // 悬空符号链接：canonicalize 失败但仍会被写操作跟随，必须追到目标
                    if let Ok(meta) = out.symlink_metadata() {
                        if meta.file_type().is_symlink() {
                            let target = std::fs::read_link(&out).ok()?;
                            let joined = match out.parent() {
                                Some(parent) => parent.join(target),
                                None => target,
                            };
                            out = canonicalize_lenient(&joined, depth + 1)?;
                        }
                    }
                }
                Component::RootDir | Component::Prefix(_) => out.push(c.as_os_str()),
            }
        }
        return Some(out);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox() -> (tempfile::TempDir, SafeFs) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        std::fs::write(dir.path().join("src/main.rs"), "fn main() {}").unwrap();
        let fs = SafeFs::new(dir.path()).unwrap();
        (dir, fs)
    }

    #[test]
    fn test_relative_paths_inside_root() {
        let (_dir, fs) = sandbox();
        let p = fs.resolve("src/main.rs").unwrap();
        assert!(p.starts_with(fs.root()));
        assert!(p.ends_with("src/main.rs"));
        assert_eq!(fs.resolve(".").unwrap(), fs.root());
        assert_eq!(fs.resolve("src/nested/..").unwrap(), fs.root().join("src"));
    }

    #[test]
    fn test_traversal_rejected() {
        let (_dir, fs) = sandbox();
        assert_eq!(fs.resolve("../outside.txt"), Err(OutsideRoot));
        assert_eq!(fs.resolve("src/../../etc/passwd"), Err(OutsideRoot));
        assert_eq!(fs.resolve("new_dir/../../escape"), Err(OutsideRoot));
    }

    #[test]
    fn test_absolute_paths() {
        let (_dir, fs) = sandbox();
        assert_eq!(fs.resolve("/etc/passwd"), Err(OutsideRoot));
        let inside = fs.root().join("src/main.rs");
        assert_eq!(fs.resolve(inside.to_str().unwrap()).unwrap(), inside);
    }

    #[test]
    fn test_nonexistent_target_inside_root() {
        let (_dir, fs) = sandbox();
        let p = fs.resolve("a/b/./c.txt").unwrap();
        assert_eq!(p, fs.root().join("a/b/c.txt"));
    }

    #[test]
    fn test_sibling_with_common_prefix_rejected() {
        let parent = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(parent.path().join("root")).unwrap();
        std::fs::create_dir_all(parent.path().join("root-other")).unwrap();
        let fs = SafeFs::new(parent.path().join("root")).unwrap();
        assert_eq!(fs.resolve("../root-other/x"), Err(OutsideRoot));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_followed() {
        let outside = tempfile::tempdir().unwrap();
        let (_dir, fs) = sandbox();
        std::os::unix::fs::symlink(outside.path(), fs.root().join("escape")).unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("missing.txt"),
            fs.root().join("dangling"),
        )
        .unwrap();
        std::os::unix::fs::symlink(fs.root().join("src"), fs.root().join("alias")).unwrap();

        assert_eq!(fs.resolve("escape/secret"), Err(OutsideRoot));
        assert_eq!(fs.resolve("dangling"), Err(OutsideRoot));
        assert_eq!(
            fs.resolve("alias/main.rs").unwrap(),
            fs.root().join("src/main.rs")
        );
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = SafeFs::new(dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, AgentError::Workspace { .. }));
    }

    #[test]
    fn test_relative_display() {
        let (_dir, fs) = sandbox();
        let p = fs.root().join("src").join("main.rs");
        assert_eq!(fs.relative(&p).as_deref(), Some("src/main.rs"));
    }
}
