use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::chunk::SourceFile;
use crate::config::UploadConfig;

/// Why a file was refused before a task was created.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionRejection {
    #[error("{file_name} does not match accepted types `{accept}`")]
    NotAccepted { file_name: String, accept: String },

    #[error("{file_name} is {size} bytes, over the {limit} byte limit")]
    TooLarge {
        file_name: String,
        size: u64,
        limit: u64,
    },

    #[error("{file_name} was refused by the before-upload hook")]
    Vetoed { file_name: String },
}

impl AdmissionRejection {
    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            AdmissionRejection::NotAccepted { .. } => "not_accepted",
            AdmissionRejection::TooLarge { .. } => "too_large",
            AdmissionRejection::Vetoed { .. } => "vetoed",
        }
    }
}

/// Caller hook deciding whether a file may be uploaded.
///
/// Plain closures `Fn(&SourceFile) -> bool` implement it; implement the
/// trait directly when the decision needs to await something.
pub trait BeforeUpload: Send + Sync {
    fn allow<'a>(&'a self, file: &'a SourceFile) -> BoxFuture<'a, bool>;
}

impl<F> BeforeUpload for F
where
    F: Fn(&SourceFile) -> bool + Send + Sync,
{
    fn allow<'a>(&'a self, file: &'a SourceFile) -> BoxFuture<'a, bool> {
        let allowed = self(file);
        async move { allowed }.boxed()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AcceptRule {
    Extension(String),
    MimeFamily(String),
    Mime(String),
}

/// Parsed `accept` list: `.ext`, `type/subtype` and `type/*` entries,
/// comma separated, case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptFilter {
    raw: String,
    rules: Vec<AcceptRule>,
}

impl AcceptFilter {
    pub fn parse(accept: &str) -> Self {
        let rules = accept
            .split(',')
            .map(|entry| entry.trim().to_ascii_lowercase())
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                if entry.starts_with('.') {
                    AcceptRule::Extension(entry)
                } else if let Some(family) = entry.strip_suffix("/*") {
                    AcceptRule::MimeFamily(format!("{family}/"))
                } else {
                    AcceptRule::Mime(entry)
                }
            })
            .collect();

        Self {
            raw: accept.to_string(),
            rules,
        }
    }

    /// An empty list accepts everything.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn matches(&self, file: &SourceFile) -> bool {
        if self.rules.is_empty() {
            return true;
        }

        let extension = file.extension();
        let mime = file.mime_type().map(|m| m.to_ascii_lowercase());

        self.rules.iter().any(|rule| match rule {
            AcceptRule::Extension(ext) => extension.as_deref() == Some(ext.as_str()),
            AcceptRule::MimeFamily(prefix) => {
                mime.as_deref().is_some_and(|m| m.starts_with(prefix.as_str()))
            }
            AcceptRule::Mime(exact) => mime.as_deref() == Some(exact.as_str()),
        })
    }
}

impl fmt::Display for AcceptFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Gate run on every submitted file, in order: accept list, size limit,
/// before-upload hook.
#[derive(Clone, Default)]
pub struct Admission {
    accept: Option<AcceptFilter>,
    max_size: Option<u64>,
    before_upload: Option<Arc<dyn BeforeUpload>>,
}

impl fmt::Debug for Admission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Admission")
            .field("accept", &self.accept)
            .field("max_size", &self.max_size)
            .field("before_upload", &self.before_upload.is_some())
            .finish()
    }
}

impl Admission {
    pub fn from_config(config: &UploadConfig) -> Self {
        Self {
            accept: config
                .accept
                .as_deref()
                .map(AcceptFilter::parse)
                .filter(|filter| !filter.is_empty()),
            max_size: config.max_size,
            before_upload: None,
        }
    }

    pub fn with_before_upload(mut self, hook: Arc<dyn BeforeUpload>) -> Self {
        self.before_upload = Some(hook);
        self
    }

    pub async fn check(&self, file: &SourceFile) -> Result<(), AdmissionRejection> {
        if let Some(filter) = &self.accept {
            if !filter.matches(file) {
                return Err(AdmissionRejection::NotAccepted {
                    file_name: file.name().to_string(),
                    accept: filter.to_string(),
                });
            }
        }

        if let Some(limit) = self.max_size {
            if file.size() > limit {
                return Err(AdmissionRejection::TooLarge {
                    file_name: file.name().to_string(),
                    size: file.size(),
                    limit,
                });
            }
        }

        if let Some(hook) = &self.before_upload {
            if !hook.allow(file).await {
                return Err(AdmissionRejection::Vetoed {
                    file_name: file.name().to_string(),
                });
            }
        }

        Ok(())
    }
}
