use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use common::{DomainError, DomainResult, random_code};
use serde::{Deserialize, Serialize};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

const ALLOWED_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "webp", "pdf"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Bucket {
    PaymentProofs,
    CarImages,
    ArticleImages,
    HandoverPhotos,
}

impl Bucket {
    pub const ALL: [Bucket; 4] = [
        Bucket::PaymentProofs,
        Bucket::CarImages,
        Bucket::ArticleImages,
        Bucket::HandoverPhotos,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::PaymentProofs => "payment-proofs",
            Bucket::CarImages => "car-images",
            Bucket::ArticleImages => "article-images",
            Bucket::HandoverPhotos => "handover-photos",
        }
    }

    pub fn parse(name: &str) -> DomainResult<Self> {
        Bucket::ALL
            .into_iter()
            .find(|b| b.as_str() == name)
            .ok_or(DomainError::NotFound("Bucket"))
    }
}

/// Reference to a stored object, as kept in the database (`bucket/name`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredObject {
    pub path: String,
    pub url: String,
}

/// Files on local disk, one directory per bucket.
pub struct Storage {
    root: PathBuf,
    public_base_url: String,
    max_bytes: usize,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str, max_bytes: usize) -> Self {
        Storage {
            root: root.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            max_bytes,
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        for bucket in Bucket::ALL {
            let dir = self.root.join(bucket.as_str());
            tokio::fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("Failed to create `{}`", dir.display()))?;
        }
        log::debug!("Storage ready at {}", self.root.display());
        Ok(())
    }

    /// Lowercase extension of an uploaded file name, if it is accepted.
    pub fn extension(filename: &str) -> DomainResult<String> {
        let ext = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        if ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
            Ok(ext)
        } else {
            Err(DomainError::invalid(format!(
                "File type not allowed, use one of: {}",
                ALLOWED_EXTENSIONS.join(", ")
            )))
        }
    }

    pub fn check_size(&self, len: usize) -> DomainResult<()> {
        if len > self.max_bytes {
            return Err(DomainError::invalid(format!(
                "File is larger than {} KB",
                self.max_bytes / 1024
            )));
        }
        Ok(())
    }

    pub async fn save(
        &self,
        bucket: Bucket,
        original_name: &str,
        bytes: &[u8],
    ) -> anyhow::Result<StoredObject> {
        let ext = Self::extension(original_name)?;
        if bytes.is_empty() {
            return Err(DomainError::invalid("File is empty").into());
        }
        self.check_size(bytes.len())?;

        let name = format!(
            "{}-{}.{}",
            Utc::now().timestamp_millis(),
            random_code(10).to_ascii_lowercase(),
            ext
        );
        let path = self.root.join(bucket.as_str()).join(&name);
        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&path)
            .await
            .with_context(|| format!("Could not create file `{}`", path.display()))?;
        file.write_all(bytes)
            .await
            .with_context(|| format!("Failed to write `{}`", path.display()))?;
        file.flush().await.context("Failed to flush uploaded file")?;

        let stored = format!("{}/{}", bucket.as_str(), name);
        log::info!("Stored {} ({} bytes)", stored, bytes.len());
        Ok(StoredObject {
            url: self.public_url(&stored),
            path: stored,
        })
    }

    /// Location on disk of `bucket/name`. Names that could leave the bucket
    /// directory are refused.
    pub fn object_path(&self, bucket: Bucket, name: &str) -> DomainResult<PathBuf> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
        if !valid {
            return Err(DomainError::NotFound("File"));
        }
        Ok(self.root.join(bucket.as_str()).join(name))
    }

    /// Checks that `reference` (`bucket/name`) points at a file already
    /// uploaded to `bucket` and returns it trimmed.
    pub async fn uploaded(&self, bucket: Bucket, reference: &str) -> anyhow::Result<String> {
        let reference = reference.trim();
        let missing = || DomainError::invalid(format!("No uploaded file at `{}`", reference));
        let name = reference
            .strip_prefix(bucket.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(missing)?;
        let path = self.object_path(bucket, name).map_err(|_| missing())?;
        let exists = tokio::fs::try_exists(&path)
            .await
            .with_context(|| format!("Failed to look up `{}`", path.display()))?;
        if !exists {
            return Err(missing().into());
        }
        Ok(reference.to_string())
    }

    pub async fn read(&self, bucket: Bucket, name: &str) -> anyhow::Result<Vec<u8>> {
        let path = self.object_path(bucket, name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(DomainError::NotFound("File").into())
            }
            Err(e) => Err(e).with_context(|| format!("Failed to read `{}`", path.display())),
        }
    }

    pub async fn delete(&self, bucket: Bucket, name: &str) -> anyhow::Result<()> {
        let path = self.object_path(bucket, name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(DomainError::NotFound("File").into())
            }
            Err(e) => Err(e).with_context(|| format!("Failed to delete `{}`", path.display())),
        }
    }

    /// Public URL of a stored reference. Absolute URLs pass through; legacy
    /// paths are cut down to their `bucket/name` tail.
    pub fn public_url(&self, stored: &str) -> String {
        let stored = stored.trim();
        if stored.starts_with("http://") || stored.starts_with("https://") {
            return stored.to_string();
        }
        let segments: Vec<&str> = stored.split('/').filter(|s| !s.is_empty()).collect();
        let start = segments
            .iter()
            .position(|s| Bucket::parse(s).is_ok())
            .unwrap_or(0);
        format!(
            "{}/files/{}",
            self.public_base_url,
            segments[start..].join("/")
        )
    }
}

pub fn content_type(name: &str) -> &'static str {
    match Storage::extension(name).as_deref() {
        Ok("jpg") | Ok("jpeg") => "image/jpeg",
        Ok("png") => "image/png",
        Ok("webp") => "image/webp",
        Ok("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(max_bytes: usize) -> Storage {
        let root = std::env::temp_dir().join(format!("car-market-{}", random_code(8)));
        Storage::new(root, "https://market.test/", max_bytes)
    }

    #[test]
    fn extensions_are_checked() {
        assert_eq!(Storage::extension("bukti.JPG").unwrap(), "jpg");
        assert_eq!(Storage::extension("scan.final.pdf").unwrap(), "pdf");
        assert!(Storage::extension("script.sh").is_err());
        assert!(Storage::extension("noext").is_err());
        assert_eq!(content_type("a.webp"), "image/webp");
        assert_eq!(content_type("a.exe"), "application/octet-stream");
    }

    #[test]
    fn public_urls_are_normalised() {
        let s = storage(1024);
        assert_eq!(
            s.public_url("payment-proofs/1-abc.jpg"),
            "https://market.test/files/payment-proofs/1-abc.jpg"
        );
        assert_eq!(
            s.public_url("/var/data/uploads/car-images/x.png"),
            "https://market.test/files/car-images/x.png"
        );
        assert_eq!(
            s.public_url("https://cdn.example.com/x.png"),
            "https://cdn.example.com/x.png"
        );
    }

    #[test]
    fn names_cannot_escape_the_bucket() {
        let s = storage(1024);
        assert!(s.object_path(Bucket::CarImages, "../secret").is_err());
        assert!(s.object_path(Bucket::CarImages, ".env").is_err());
        assert!(s.object_path(Bucket::CarImages, "a/b.jpg").is_err());
        assert!(s.object_path(Bucket::CarImages, "1-abc.jpg").is_ok());
        assert_eq!(Bucket::parse("handover-photos").unwrap(), Bucket::HandoverPhotos);
        assert!(Bucket::parse("secrets").is_err());
    }

    #[tokio::test]
    async fn save_read_delete() {
        let s = storage(16);
        s.init().await.unwrap();

        let stored = s
            .save(Bucket::PaymentProofs, "bukti.png", b"png-bytes")
            .await
            .unwrap();
        assert!(stored.path.starts_with("payment-proofs/"));
        assert!(stored.url.ends_with(&stored.path));

        let name = stored.path.trim_start_matches("payment-proofs/");
        assert_eq!(s.read(Bucket::PaymentProofs, name).await.unwrap(), b"png-bytes");

        assert!(s.save(Bucket::PaymentProofs, "big.png", &[0u8; 17]).await.is_err());
        assert!(s.save(Bucket::PaymentProofs, "empty.png", &[]).await.is_err());

        assert_eq!(
            s.uploaded(Bucket::PaymentProofs, &format!(" {} ", stored.path)).await.unwrap(),
            stored.path
        );
        for bogus in [
            "payment-proofs/1-missing.jpg",
            "payment-proofs/../../etc/passwd",
            "https://evil.example/x.jpg",
            "car-images/x.jpg",
            "",
        ] {
            let err = s.uploaded(Bucket::PaymentProofs, bogus).await.unwrap_err();
            assert!(matches!(err.downcast_ref::<DomainError>(), Some(DomainError::Invalid(_))));
        }
        assert!(s.uploaded(Bucket::CarImages, &stored.path).await.is_err());

        s.delete(Bucket::PaymentProofs, name).await.unwrap();
        let err = s.read(Bucket::PaymentProofs, name).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<DomainError>(),
            Some(&DomainError::NotFound("File"))
        );
    }
}
