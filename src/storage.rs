use crate::error::{PipelineError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

const UPLOAD_SUFFIX: &str = ".upload-tmp";

/// Object-name pattern where `*` matches any run of characters.
#[derive(Debug, Clone)]
pub struct Wildcard {
    pattern: String,
    regex: Regex,
}

impl Wildcard {
    pub fn new(pattern: &str) -> Result<Self> {
        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("^{}$", body))
            .map_err(|e| PipelineError::ConfigError(format!("Invalid pattern {}: {}", pattern, e)))?;

        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// Literal part before the first `*`.
    pub fn prefix(&self) -> &str {
        self.pattern.split('*').next().unwrap_or("")
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }
}

/// A bucket backed by a directory: `<root>/<bucket>/<object name>`.
pub struct LocalBucket {
    name: String,
    dir: PathBuf,
}

impl LocalBucket {
    pub async fn open(root: &Path, name: &str) -> Result<Self> {
        if name.is_empty() || name.contains(|c: char| c == '/' || c == '\\') || name.starts_with('.') {
            return Err(PipelineError::ConfigError(format!("Invalid bucket name: {}", name)));
        }

        let dir = root.join(name);
        fs::create_dir_all(&dir).await?;

        Ok(Self {
            name: name.to_string(),
            dir,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Writes the object atomically, replacing any previous version.
    pub async fn upload(&self, object: &str, data: &[u8]) -> Result<()> {
        let path = self.path_for(object)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let tmp = path.with_file_name(format!(
            ".{}{}",
            Uuid::new_v4(),
            UPLOAD_SUFFIX
        ));
        fs::write(&tmp, data).await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!("Uploaded object {}/{} ({} bytes)", self.name, object, data.len());
        Ok(())
    }

    pub async fn download(&self, object: &str) -> Result<Vec<u8>> {
        let path = self.path_for(object)?;
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(PipelineError::StorageError(
                format!("Object not found: {}/{}", self.name, object),
            )),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self, object: &str) -> Result<bool> {
        let path = self.path_for(object)?;
        Ok(fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false))
    }

    /// Sorted names of all objects starting with `prefix`.
    pub async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut pending = vec![(self.dir.clone(), String::new())];

        while let Some((dir, rel)) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let file_name = match entry.file_name().into_string() {
                    Ok(name) => name,
                    Err(_) => continue,
                };
                let name = format!("{}{}", rel, file_name);
                let file_type = entry.file_type().await?;

                if file_type.is_dir() {
                    let dir_prefix = format!("{}/", name);
                    // Only descend where the prefix can still match.
                    if dir_prefix.starts_with(prefix) || prefix.starts_with(&dir_prefix) {
                        pending.push((entry.path(), dir_prefix));
                    }
                } else if file_type.is_file()
                    && !file_name.ends_with(UPLOAD_SUFFIX)
                    && name.starts_with(prefix)
                {
                    names.push(name);
                }
            }
        }

        names.sort();
        Ok(names)
    }

    pub async fn list_matching(&self, wildcard: &Wildcard) -> Result<Vec<String>> {
        let names = self.list(wildcard.prefix()).await?;
        Ok(names.into_iter().filter(|n| wildcard.matches(n)).collect())
    }

    fn path_for(&self, object: &str) -> Result<PathBuf> {
        let valid = !object.is_empty()
            && !object.contains('\\')
            && object
                .split('/')
                .all(|seg| !seg.is_empty() && seg != "." && seg != "..");
        if !valid {
            return Err(PipelineError::InvalidObjectName(object.to_string()));
        }

        Ok(object.split('/').fold(self.dir.clone(), |path, seg| path.join(seg)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::temp_dir;

    #[test]
    fn test_wildcard_matching() {
        let wildcard = Wildcard::new("raw/coingecko/coingecko_price_*.json").unwrap();
        assert_eq!(wildcard.prefix(), "raw/coingecko/coingecko_price_");
        assert!(wildcard.matches("raw/coingecko/coingecko_price_20241019.json"));
        assert!(wildcard.matches("raw/coingecko/coingecko_price_.json"));
        assert!(!wildcard.matches("raw/coingecko/coingecko_price_20241019.json.bak"));
        assert!(!wildcard.matches("raw/coingecko/coingecko_volume_20241019.json"));
        assert!(!wildcard.matches("archive/raw/coingecko/coingecko_price_20241019.json"));
    }

    #[test]
    fn test_wildcard_escapes_regex_characters() {
        let wildcard = Wildcard::new("a+b/(x)_*.json").unwrap();
        assert!(wildcard.matches("a+b/(x)_1.json"));
        assert!(!wildcard.matches("aab/(x)_1.json"));
        assert!(!wildcard.matches("a+b/(x)_1xjson"));
    }

    #[tokio::test]
    async fn test_upload_download_and_overwrite() {
        let root = temp_dir();
        let bucket = LocalBucket::open(&root, "prices").await.unwrap();

        bucket.upload("raw/a.json", b"{\"v\":1}").await.unwrap();
        bucket.upload("raw/a.json", b"{\"v\":2}").await.unwrap();

        assert!(bucket.exists("raw/a.json").await.unwrap());
        assert_eq!(bucket.download("raw/a.json").await.unwrap(), b"{\"v\":2}");
        assert_eq!(bucket.list("").await.unwrap(), vec!["raw/a.json"]);
    }

    #[tokio::test]
    async fn test_list_filters_by_prefix_and_wildcard() {
        let root = temp_dir();
        let bucket = LocalBucket::open(&root, "prices").await.unwrap();
        for name in [
            "raw/coingecko/coingecko_price_20241002.json",
            "raw/coingecko/coingecko_price_20241001.json",
            "raw/coingecko/notes.txt",
            "raw/other/coingecko_price_20241001.json",
            "top.json",
        ] {
            bucket.upload(name, b"{}").await.unwrap();
        }

        assert_eq!(
            bucket.list("raw/coingecko/").await.unwrap(),
            vec![
                "raw/coingecko/coingecko_price_20241001.json",
                "raw/coingecko/coingecko_price_20241002.json",
                "raw/coingecko/notes.txt",
            ]
        );

        let wildcard = Wildcard::new("raw/coingecko/coingecko_price_*.json").unwrap();
        assert_eq!(
            bucket.list_matching(&wildcard).await.unwrap(),
            vec![
                "raw/coingecko/coingecko_price_20241001.json",
                "raw/coingecko/coingecko_price_20241002.json",
            ]
        );
    }

    #[tokio::test]
    async fn test_rejects_unsafe_names() {
        let root = temp_dir();
        let bucket = LocalBucket::open(&root, "prices").await.unwrap();

        for name in ["", "/abs.json", "raw/../escape.json", "raw//a.json", "raw\\a.json"] {
            assert!(matches!(
                bucket.upload(name, b"{}").await,
                Err(PipelineError::InvalidObjectName(_))
            ));
        }
        assert!(LocalBucket::open(&root, "../up").await.is_err());
    }

    #[tokio::test]
    async fn test_missing_object_is_storage_error() {
        let root = temp_dir();
        let bucket = LocalBucket::open(&root, "prices").await.unwrap();
        assert!(matches!(
            bucket.download("raw/none.json").await,
            Err(PipelineError::StorageError(_))
        ));
    }
}
