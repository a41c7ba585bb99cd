use std::path::{Path, PathBuf};

use crate::error::AppError;

/// 已解析且确认位于根目录内的源文件
#[derive(Debug, Clone)]
pub struct ResolvedSource {
    /// 调用方传入的原始 `src`（用于 404 文案）
    pub logical: String,
    /// 规范化后的物理路径
    pub path: PathBuf,
}

impl ResolvedSource {
    pub fn not_found(&self) -> AppError {
        AppError::SourceNotFound(self.logical.clone())
    }
}

/// 源解析器：把逻辑路径限定在固定根目录下。
///
/// 根目录在构造时规范化一次；若当时根目录不存在，则在每次解析时重试。
#[derive(Debug, Clone)]
pub struct SourceResolver {
    root: PathBuf,
    canonical_root: Option<PathBuf>,
}

impl SourceResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let canonical_root = match std::fs::canonicalize(&root) {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::warn!("资源根目录 {:?} 无法规范化: {}（将在请求时重试）", root, e);
                None
            }
        };
        Self {
            root,
            canonical_root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn canonical_root(&self) -> Option<PathBuf> {
        if let Some(p) = &self.canonical_root {
            return Some(p.clone());
        }
        tokio::fs::canonicalize(&self.root).await.ok()
    }

    /// 解析 `src`：拼接根目录 → 规范化 → 校验仍在根目录内 → 校验为普通文件。
    ///
    /// 任何一步失败都报告为 `SourceNotFound`，越界访问只记日志，不向调用方暴露。
    pub async fn resolve(&self, logical: &str) -> Result<ResolvedSource, AppError> {
        let not_found = || AppError::SourceNotFound(logical.to_string());

        let root = self.canonical_root().await.ok_or_else(not_found)?;
        // 前导 `/` 会让 join 变成绝对路径，必须去掉。
        let relative = logical.trim_start_matches(['/', '\\']);
        let candidate = root.join(relative);

        let path = tokio::fs::canonicalize(&candidate)
            .await
            .map_err(|_| not_found())?;
        if !path.starts_with(&root) {
            tracing::warn!(src = logical, resolved = ?path, "拒绝越出资源根目录的路径");
            return Err(not_found());
        }

        let meta = tokio::fs::metadata(&path).await.map_err(|_| not_found())?;
        if !meta.is_file() {
            return Err(not_found());
        }

        Ok(ResolvedSource {
            logical: logical.to_string(),
            path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::SourceResolver;
    use crate::error::AppError;

    fn layout() -> (tempfile::TempDir, SourceResolver) {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path().join("public");
        std::fs::create_dir_all(root.join("nested")).unwrap();
        std::fs::write(root.join("a.png"), b"a").unwrap();
        std::fs::write(root.join("nested/b.png"), b"b").unwrap();
        std::fs::write(tmp.path().join("secret.txt"), b"secret").unwrap();
        let resolver = SourceResolver::new(&root);
        (tmp, resolver)
    }

    #[tokio::test]
    async fn resolves_with_and_without_leading_slash() {
        let (_tmp, resolver) = layout();
        let a = resolver.resolve("/a.png").await.expect("resolve /a.png");
        assert!(a.path.ends_with("a.png"));
        assert_eq!(a.logical, "/a.png");
        let b = resolver.resolve("nested/b.png").await.expect("resolve nested");
        assert!(b.path.ends_with("nested/b.png"));
    }

    #[tokio::test]
    async fn missing_file_is_not_found_with_logical_name() {
        let (_tmp, resolver) = layout();
        match resolver.resolve("/does-not-exist.png").await {
            Err(AppError::SourceNotFound(src)) => assert_eq!(src, "/does-not-exist.png"),
            other => panic!("expected SourceNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn traversal_outside_root_is_refused() {
        let (_tmp, resolver) = layout();
        assert!(matches!(
            resolver.resolve("../secret.txt").await,
            Err(AppError::SourceNotFound(_))
        ));
        assert!(matches!(
            resolver.resolve("/nested/../../secret.txt").await,
            Err(AppError::SourceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn directories_are_not_sources() {
        let (_tmp, resolver) = layout();
        assert!(matches!(
            resolver.resolve("/nested").await,
            Err(AppError::SourceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn missing_root_reports_not_found() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let resolver = SourceResolver::new(tmp.path().join("nope"));
        assert!(matches!(
            resolver.resolve("/a.png").await,
            Err(AppError::SourceNotFound(_))
        ));
    }
}
