use std::collections::HashMap;
use std::sync::Mutex;

use kml_validate::{FetchError, FetchedResource, ResourceFetcher};
use url::Url;

/// In-memory fetcher that serves canned responses and records every request
#[derive(Default)]
pub struct MockFetcher {
    responses: Mutex<HashMap<String, MockResponse>>,
    request_log: Mutex<Vec<String>>,
}

#[derive(Clone, Debug)]
pub enum MockResponse {
    Body {
        content_type: Option<String>,
        bytes: Vec<u8>,
    },
    Status(u16),
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_response(&self, uri: &str, response: MockResponse) {
        self.responses
            .lock()
            .unwrap()
            .insert(uri.to_string(), response);
    }

    pub fn add_document(&self, uri: &str, text: &str) {
        self.add_response(
            uri,
            MockResponse::Body {
                content_type: Some("application/vnd.google-earth.kml+xml".to_string()),
                bytes: text.as_bytes().to_vec(),
            },
        );
    }

    pub fn add_image(&self, uri: &str) {
        self.add_response(
            uri,
            MockResponse::Body {
                content_type: Some("image/png".to_string()),
                bytes: vec![0x89, b'P', b'N', b'G'],
            },
        );
    }

    pub fn add_error_response(&self, uri: &str, status: u16) {
        self.add_response(uri, MockResponse::Status(status));
    }

    /// URIs requested so far, in order
    pub fn requests(&self) -> Vec<String> {
        self.request_log.lock().unwrap().clone()
    }

    pub fn request_count(&self, uri: &str) -> usize {
        self.request_log
            .lock()
            .unwrap()
            .iter()
            .filter(|r| *r == uri)
            .count()
    }
}

impl ResourceFetcher for MockFetcher {
    fn fetch(&self, uri: &Url) -> Result<FetchedResource, FetchError> {
        let key = uri.as_str().to_string();
        self.request_log.lock().unwrap().push(key.clone());

        match self.responses.lock().unwrap().get(&key).cloned() {
            Some(MockResponse::Body {
                content_type,
                bytes,
            }) => Ok(FetchedResource {
                uri: uri.clone(),
                content_type,
                bytes,
            }),
            Some(MockResponse::Status(status)) => Err(FetchError::HttpStatus { uri: key, status }),
            None => Err(FetchError::NotFound { uri: key }),
        }
    }
}
