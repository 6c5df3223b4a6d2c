//! Scripted download method for tests

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{DownloadContext, DownloadMethod};
use crate::error::{Result, XbuddyError};
use crate::types::MethodKind;
use crate::url::{is_hls_url, url_digest};

pub(crate) type CallLog = Arc<Mutex<Vec<(MethodKind, String)>>>;

/// Writes scripted bytes for known URLs and answers 403 for the rest
pub(crate) struct ScriptedMethod {
    kind: MethodKind,
    files: HashMap<String, Vec<u8>>,
    calls: CallLog,
}

impl ScriptedMethod {
    pub fn new(kind: MethodKind, calls: &CallLog) -> Self {
        Self {
            kind,
            files: HashMap::new(),
            calls: calls.clone(),
        }
    }

    pub fn serving(mut self, url: &str, bytes: &[u8]) -> Self {
        self.files.insert(url.to_string(), bytes.to_vec());
        self
    }

    /// File name written for `url`
    pub fn file_name(kind: MethodKind, url: &str) -> String {
        format!("{}-{}", kind, url_digest(url))
    }

    pub fn boxed(self) -> Box<dyn DownloadMethod> {
        Box::new(self)
    }
}

#[async_trait]
impl DownloadMethod for ScriptedMethod {
    fn kind(&self) -> MethodKind {
        self.kind
    }

    fn applies_to(&self, url: &str) -> bool {
        self.kind != MethodKind::Hls || is_hls_url(url)
    }

    async fn fetch(&self, url: &str, ctx: &DownloadContext) -> Result<PathBuf> {
        self.calls.lock().unwrap().push((self.kind, url.to_string()));
        let Some(bytes) = self.files.get(url) else {
            return Err(XbuddyError::HttpStatus {
                status: 403,
                url: url.to_string(),
            });
        };
        std::fs::create_dir_all(&ctx.dest_dir)?;
        let path = ctx.dest_dir.join(Self::file_name(self.kind, url));
        std::fs::write(&path, bytes)?;
        Ok(path)
    }
}
