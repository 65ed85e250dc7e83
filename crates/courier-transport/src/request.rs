//! Outbound requests and file attachments.
//!
//! Request parameters are ordinary `Serialize` types. Fields holding an
//! [`InputFile`] are resolved while the parameters are serialized:
//!
//! - a [`InputFile::Remote`] reference is written inline as a plain string;
//! - a new file (on disk or in memory) is given a process-unique name, added
//!   to the request's attachment list, and written as `attach://<name>`.
//!
//! This works at any nesting depth, so a media group where only some items
//! carry new files resolves per item.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::ser::Error as _;
use serde::{Serialize, Serializer};
use serde_json::Value;

use courier_core::{ApiError, ApiResult};

/// Prefix of an attachment placeholder in a serialized body.
pub const ATTACH_SCHEME: &str = "attach://";

/// A file parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputFile {
    /// A file on disk. Streamed when sent.
    Path(PathBuf),
    /// In-memory contents.
    Memory { file_name: String, data: Vec<u8> },
    /// A file the remote already knows, by id or URL.
    Remote(String),
}

impl InputFile {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    pub fn memory(file_name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self::Memory {
            file_name: file_name.into(),
            data: data.into(),
        }
    }

    pub fn remote(reference: impl Into<String>) -> Self {
        Self::Remote(reference.into())
    }

    /// Whether sending this file requires an upload.
    pub fn is_upload(&self) -> bool {
        !matches!(self, Self::Remote(_))
    }
}

impl Serialize for InputFile {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if let Self::Remote(reference) = self {
            return serializer.serialize_str(reference);
        }

        let name = COLLECTOR.with(|collector| {
            let mut collector = collector.borrow_mut();
            let attachments = collector.as_mut()?;
            let name = format!("file{}", NEXT_ATTACHMENT.fetch_add(1, Ordering::Relaxed));
            attachments.push(Attachment {
                name: name.clone(),
                file: self.clone(),
            });
            Some(name)
        });

        match name {
            Some(name) => serializer.serialize_str(&format!("{ATTACH_SCHEME}{name}")),
            None => Err(S::Error::custom(
                "files to upload can only be serialized through ApiRequest::new",
            )),
        }
    }
}

/// A new file collected from request parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    name: String,
    file: InputFile,
}

impl Attachment {
    /// Generated part name; the body refers to it as `attach://<name>`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn file(&self) -> &InputFile {
        &self.file
    }

    /// File name reported to the remote.
    pub fn file_name(&self) -> String {
        match &self.file {
            InputFile::Path(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.name.clone()),
            InputFile::Memory { file_name, .. } => file_name.clone(),
            InputFile::Remote(_) => self.name.clone(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.file {
            InputFile::Path(path) => Some(path),
            _ => None,
        }
    }
}

thread_local! {
    static COLLECTOR: RefCell<Option<Vec<Attachment>>> = const { RefCell::new(None) };
}

static NEXT_ATTACHMENT: AtomicU64 = AtomicU64::new(0);

/// Installs a fresh collector for one synchronous serialization and restores
/// the previous one afterwards, even on unwind.
struct CollectScope {
    previous: Option<Option<Vec<Attachment>>>,
}

impl CollectScope {
    fn enter() -> Self {
        let previous = COLLECTOR.with(|c| c.replace(Some(Vec::new())));
        Self {
            previous: Some(previous),
        }
    }

    fn finish(&mut self) -> Vec<Attachment> {
        match self.previous.take() {
            Some(previous) => COLLECTOR.with(|c| c.replace(previous)).unwrap_or_default(),
            None => Vec::new(),
        }
    }
}

impl Drop for CollectScope {
    fn drop(&mut self) {
        self.finish();
    }
}

/// A method call against the remote API.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: String,
    body: Value,
    attachments: Vec<Attachment>,
}

impl ApiRequest {
    /// Serializes `params`, collecting new files as attachments.
    pub fn new<P>(method: impl Into<String>, params: &P) -> ApiResult<Self>
    where
        P: Serialize + ?Sized,
    {
        let method = method.into();
        let mut scope = CollectScope::enter();
        let body = serde_json::to_value(params);
        let attachments = scope.finish();
        let body = body?;

        if !attachments.is_empty() && !body.is_object() {
            return Err(ApiError::Serialization(format!(
                "`{method}` parameters must serialize to an object to carry files"
            )));
        }

        Ok(Self {
            method,
            body,
            attachments,
        })
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    /// Whether the request must be sent as form data.
    pub fn is_multipart(&self) -> bool {
        !self.attachments.is_empty()
    }

    /// Top-level body fields as text form parts. Strings are sent as-is,
    /// other values JSON-encoded; nulls are left out.
    pub fn form_fields(&self) -> ApiResult<Vec<(String, String)>> {
        let Value::Object(fields) = &self.body else {
            return Err(ApiError::Serialization(format!(
                "`{}` parameters must serialize to an object to be sent as form data",
                self.method
            )));
        };

        Ok(fields
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(key, value)| {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), text)
            })
            .collect())
    }
}
