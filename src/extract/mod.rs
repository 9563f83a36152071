//! Text extraction pipeline: native PDF text layer first, OCR fallback.
//!
//! The actual PDF engine and OCR worker live in the host; this module owns
//! the decision logic and talks to them through request/reply calls. All
//! failures degrade to empty text rather than aborting the pipeline.

use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use base64::Engine as _;
use tracing::{debug, warn};

use crate::ipc::{CallTable, HostReply, UiEvent, UiSender};

/// A native text layer shorter than this (trimmed) is treated as a scanned
/// document and retried through OCR.
pub const MIN_NATIVE_TEXT: usize = 10;

/// Separator between page texts in the joined output.
const PAGE_BREAK: &str = "\n\n";

const PDF_CALL_TIMEOUT: Duration = Duration::from_secs(30);
const OCR_CALL_TIMEOUT: Duration = Duration::from_secs(120);

/// Where the extracted text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractSource {
    Native,
    Ocr,
}

impl ExtractSource {
    pub fn label(&self) -> &'static str {
        match self {
            ExtractSource::Native => "text layer",
            ExtractSource::Ocr => "OCR",
        }
    }
}

/// PDF engine: read the text layer, or rasterize pages for OCR.
#[allow(async_fn_in_trait)]
pub trait PdfEngine {
    async fn page_texts(&self, data: &[u8]) -> Result<Vec<String>>;
    async fn render_pages(&self, data: &[u8]) -> Result<Vec<Vec<u8>>>;
}

/// OCR engine: recognize text in one page image.
#[allow(async_fn_in_trait)]
pub trait OcrEngine {
    async fn recognize(&self, image: &[u8]) -> Result<String>;
}

/// Host-delegated PDF engine. Requests carry base64 payloads; replies are
/// matched back through the shared call table.
#[derive(Clone)]
pub struct HostPdfEngine {
    ui: UiSender,
    calls: CallTable,
}

impl HostPdfEngine {
    pub fn new(ui: UiSender, calls: CallTable) -> Self {
        Self { ui, calls }
    }
}

impl PdfEngine for HostPdfEngine {
    async fn page_texts(&self, data: &[u8]) -> Result<Vec<String>> {
        let (request_id, rx) = self.calls.register();
        self.ui.send(UiEvent::PdfTextRequest {
            request_id: request_id.clone(),
            data: base64::engine::general_purpose::STANDARD.encode(data),
        });
        await_pages(&self.calls, &request_id, rx, PDF_CALL_TIMEOUT).await
    }

    async fn render_pages(&self, data: &[u8]) -> Result<Vec<Vec<u8>>> {
        let (request_id, rx) = self.calls.register();
        self.ui.send(UiEvent::RenderPagesRequest {
            request_id: request_id.clone(),
            data: base64::engine::general_purpose::STANDARD.encode(data),
        });
        let pages = await_pages(&self.calls, &request_id, rx, PDF_CALL_TIMEOUT).await?;
        pages
            .iter()
            .map(|page| {
                base64::engine::general_purpose::STANDARD
                    .decode(page)
                    .map_err(|e| anyhow!("Invalid page image from host: {}", e))
            })
            .collect()
    }
}

/// Host-delegated OCR worker.
#[derive(Clone)]
pub struct HostOcrEngine {
    ui: UiSender,
    calls: CallTable,
}

impl HostOcrEngine {
    pub fn new(ui: UiSender, calls: CallTable) -> Self {
        Self { ui, calls }
    }
}

impl OcrEngine for HostOcrEngine {
    async fn recognize(&self, image: &[u8]) -> Result<String> {
        let (request_id, rx) = self.calls.register();
        self.ui.send(UiEvent::OcrRequest {
            request_id: request_id.clone(),
            image: base64::engine::general_purpose::STANDARD.encode(image),
        });
        let reply = await_reply(&self.calls, &request_id, rx, OCR_CALL_TIMEOUT).await?;
        match reply {
            HostReply::Text(text) => Ok(text),
            HostReply::Failure(reason) => bail!("OCR failed: {}", reason),
            HostReply::Pages(_) => bail!("Unexpected page reply to an OCR request"),
        }
    }
}

async fn await_reply(
    calls: &CallTable,
    request_id: &str,
    rx: tokio::sync::oneshot::Receiver<HostReply>,
    timeout: Duration,
) -> Result<HostReply> {
    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(reply)) => Ok(reply),
        Ok(Err(_)) => bail!("Host dropped the call"),
        Err(_) => {
            calls.forget(request_id);
            bail!("Host call timed out after {:?}", timeout);
        }
    }
}

async fn await_pages(
    calls: &CallTable,
    request_id: &str,
    rx: tokio::sync::oneshot::Receiver<HostReply>,
    timeout: Duration,
) -> Result<Vec<String>> {
    match await_reply(calls, request_id, rx, timeout).await? {
        HostReply::Pages(pages) => Ok(pages),
        HostReply::Failure(reason) => bail!("PDF engine failed: {}", reason),
        HostReply::Text(_) => bail!("Unexpected text reply to a page request"),
    }
}

/// Decides between the native text layer and OCR, and runs whichever
/// passes are needed.
pub struct ExtractionOrchestrator<P, O> {
    pdf: P,
    ocr: O,
}

impl<P: PdfEngine, O: OcrEngine> ExtractionOrchestrator<P, O> {
    pub fn new(pdf: P, ocr: O) -> Self {
        Self { pdf, ocr }
    }

    /// Extract text from a document. Images always go straight to OCR, as
    /// does `force_ocr`. PDFs try the native text layer first and fall back
    /// to OCR when it comes back too short to be a real text layer; the
    /// native result is kept if the OCR pass produces nothing.
    pub async fn extract(&self, data: &[u8], is_image: bool, force_ocr: bool) -> (String, ExtractSource) {
        if is_image || force_ocr {
            return (self.ocr_pass(data).await, ExtractSource::Ocr);
        }

        let native = match self.pdf.page_texts(data).await {
            Ok(pages) => join_pages(pages),
            Err(e) => {
                warn!("Native text extraction failed: {:#}", e);
                String::new()
            }
        };
        if native.trim().len() >= MIN_NATIVE_TEXT {
            return (native, ExtractSource::Native);
        }

        debug!(
            native_len = native.trim().len(),
            "Text layer too short, retrying with OCR"
        );
        let recognized = self.ocr_pass(data).await;
        if recognized.trim().is_empty() {
            (native, ExtractSource::Native)
        } else {
            (recognized, ExtractSource::Ocr)
        }
    }

    /// Rasterize every page and recognize them one by one. Failed pages are
    /// skipped so one bad page does not lose the rest of the document.
    async fn ocr_pass(&self, data: &[u8]) -> String {
        let images = match self.pdf.render_pages(data).await {
            Ok(images) => images,
            Err(e) => {
                warn!("Page rendering failed: {:#}", e);
                return String::new();
            }
        };

        let mut pages = Vec::new();
        for (index, image) in images.iter().enumerate() {
            match self.ocr.recognize(image).await {
                Ok(text) if !text.trim().is_empty() => pages.push(text),
                Ok(_) => debug!(page = index + 1, "OCR found no text on page"),
                Err(e) => warn!(page = index + 1, "OCR failed: {:#}", e),
            }
        }
        join_pages(pages)
    }
}

fn join_pages(pages: Vec<String>) -> String {
    pages
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(PAGE_BREAK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakePdf {
        texts: Vec<String>,
        pages: usize,
        fail_texts: bool,
    }

    impl PdfEngine for FakePdf {
        async fn page_texts(&self, _data: &[u8]) -> Result<Vec<String>> {
            if self.fail_texts {
                bail!("broken text layer");
            }
            Ok(self.texts.clone())
        }

        async fn render_pages(&self, _data: &[u8]) -> Result<Vec<Vec<u8>>> {
            Ok(vec![vec![0u8; 4]; self.pages])
        }
    }

    struct FakeOcr {
        per_page: String,
        calls: AtomicUsize,
    }

    impl FakeOcr {
        fn returning(text: &str) -> Self {
            Self {
                per_page: text.to_string(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl OcrEngine for FakeOcr {
        async fn recognize(&self, _image: &[u8]) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.per_page.clone())
        }
    }

    #[tokio::test]
    async fn good_text_layer_skips_ocr() {
        let pdf = FakePdf {
            texts: vec!["This page has a real text layer.".into()],
            pages: 1,
            fail_texts: false,
        };
        let ocr = FakeOcr::returning("should not run");
        let orch = ExtractionOrchestrator::new(pdf, ocr);

        let (text, source) = orch.extract(b"pdf", false, false).await;
        assert_eq!(source, ExtractSource::Native);
        assert_eq!(text, "This page has a real text layer.");
        assert_eq!(orch.ocr.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn short_text_layer_falls_back_to_ocr() {
        let pdf = FakePdf {
            texts: vec!["a b".into()],
            pages: 2,
            fail_texts: false,
        };
        let ocr = FakeOcr::returning("scanned words");
        let orch = ExtractionOrchestrator::new(pdf, ocr);

        let (text, source) = orch.extract(b"pdf", false, false).await;
        assert_eq!(source, ExtractSource::Ocr);
        assert_eq!(text, "scanned words\n\nscanned words");
        assert_eq!(orch.ocr.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_ocr_keeps_short_native_text() {
        let pdf = FakePdf {
            texts: vec!["a b".into()],
            pages: 1,
            fail_texts: false,
        };
        let ocr = FakeOcr::returning("   ");
        let orch = ExtractionOrchestrator::new(pdf, ocr);

        let (text, source) = orch.extract(b"pdf", false, false).await;
        assert_eq!(source, ExtractSource::Native);
        assert_eq!(text, "a b");
    }

    #[tokio::test]
    async fn force_ocr_skips_the_text_layer() {
        let pdf = FakePdf {
            texts: vec!["This is a perfectly good text layer.".into()],
            pages: 1,
            fail_texts: false,
        };
        let ocr = FakeOcr::returning("ocr view");
        let orch = ExtractionOrchestrator::new(pdf, ocr);

        let (text, source) = orch.extract(b"pdf", false, true).await;
        assert_eq!(source, ExtractSource::Ocr);
        assert_eq!(text, "ocr view");
    }

    #[tokio::test]
    async fn images_go_straight_to_ocr() {
        let pdf = FakePdf {
            texts: vec![],
            pages: 1,
            fail_texts: true,
        };
        let ocr = FakeOcr::returning("image words");
        let orch = ExtractionOrchestrator::new(pdf, ocr);

        let (text, source) = orch.extract(b"png", true, false).await;
        assert_eq!(source, ExtractSource::Ocr);
        assert_eq!(text, "image words");
    }

    #[tokio::test]
    async fn total_failure_degrades_to_empty_text() {
        struct BrokenPdf;
        impl PdfEngine for BrokenPdf {
            async fn page_texts(&self, _data: &[u8]) -> Result<Vec<String>> {
                bail!("no engine");
            }
            async fn render_pages(&self, _data: &[u8]) -> Result<Vec<Vec<u8>>> {
                bail!("no engine");
            }
        }
        let orch = ExtractionOrchestrator::new(BrokenPdf, FakeOcr::returning("x"));
        let (text, source) = orch.extract(b"pdf", false, false).await;
        assert_eq!(text, "");
        assert_eq!(source, ExtractSource::Native);
    }
}
