use super::ResolveError;
use crate::types::{MediaExtensions, SubmissionRecord};
use crate::util::extension_of;

/// Accepts URLs that already point at a media file. Never issues a request.
#[derive(Debug, Clone)]
pub struct DirectResolver {
    extensions: MediaExtensions,
}

impl DirectResolver {
    pub fn new(extensions: MediaExtensions) -> Self {
        Self { extensions }
    }

    pub fn resolve(&self, record: &mut SubmissionRecord) -> Result<(), ResolveError> {
        match extension_of(&record.url) {
            Some(ext) if self.extensions.is_known(&ext) => Ok(()),
            Some(ext) => Err(ResolveError::unavailable(
                &record.url,
                format!("unrecognized extension `{ext}`"),
            )),
            None => Err(ResolveError::unavailable(&record.url, "no file extension")),
        }
    }
}
