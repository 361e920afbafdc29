//! Optional per-request observers for the response head and body.

use h1_core::ResponseInfo;

/// Called once the response head has been parsed. `Err` aborts the request.
pub type HeadersHook = Box<dyn FnMut(&ResponseInfo) -> Result<(), String> + Send>;

/// Called with each decoded body fragment. `Err` aborts the request.
pub type ContentHook = Box<dyn FnMut(&[u8]) -> Result<(), String> + Send>;

/// Streaming hooks for one request.
///
/// When a content hook is installed, body fragments go to the hook and are
/// not accumulated into `ResponseInfo::content`.
#[derive(Default)]
pub struct ResponseHooks {
    pub(crate) on_headers: Option<HeadersHook>,
    pub(crate) on_content: Option<ContentHook>,
}

impl ResponseHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_headers<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&ResponseInfo) -> Result<(), String> + Send + 'static,
    {
        self.on_headers = Some(Box::new(hook));
        self
    }

    pub fn on_content<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&[u8]) -> Result<(), String> + Send + 'static,
    {
        self.on_content = Some(Box::new(hook));
        self
    }
}

impl std::fmt::Debug for ResponseHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseHooks")
            .field("on_headers", &self.on_headers.is_some())
            .field("on_content", &self.on_content.is_some())
            .finish()
    }
}
