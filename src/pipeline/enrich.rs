//! Multimodal enrichment: resolve each chunk's image placeholders to stored
//! images with OCR text and captions.
//!
//! Every placeholder becomes one spawned task. A single document-wide
//! `Semaphore` bounds how many run at once; a task holds its permit for the
//! whole fetch → upload → OCR/caption lifecycle. Results are attached back
//! to their chunk in placeholder order no matter which task finishes first.
//!
//! Failures stay local to the image:
//! * fetch or upload failure: image omitted, diagnostic recorded
//! * OCR or caption failure: image kept with that field empty, diagnostic
//!   recorded
//! * deadline expiry: unfinished tasks aborted, `Timeout` diagnostic each

use crate::error::{ImageDiagnostic, ImageError};
use crate::model::{Chunk, ImageInfo, ImageRef};
use crate::pipeline::fetch::ImageFetcher;
use crate::progress::ProgressCallback;
use crate::services::{ImageCaptioner, ObjectStorage, OcrEngine};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

/// The collaborators one enrichment run talks to.
#[derive(Clone)]
pub struct Enricher {
    pub store: Arc<dyn ObjectStorage>,
    pub ocr: Option<Arc<dyn OcrEngine>>,
    pub captioner: Option<Arc<dyn ImageCaptioner>>,
    pub progress: ProgressCallback,
    /// Document-wide cap on images in flight.
    pub concurrency: usize,
    /// Prepended to every upload key.
    pub path_prefix: String,
}

/// What happened to the images of one document.
#[derive(Debug, Clone, Default)]
pub struct EnrichmentReport {
    pub images_found: usize,
    pub images_attached: usize,
    pub diagnostics: Vec<ImageDiagnostic>,
    /// True when the deadline cut the stage short.
    pub deadline_hit: bool,
}

impl EnrichmentReport {
    /// Images that were dropped from their chunk.
    pub fn images_failed(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.error.omits_image())
            .count()
    }
}

/// Result of one image task.
struct ImageOutcome {
    info: Option<ImageInfo>,
    errors: Vec<ImageError>,
}

/// Every placeholder of every chunk, in document order.
pub fn collect_image_refs(chunks: &[Chunk], fetcher: &ImageFetcher) -> Vec<ImageRef> {
    chunks
        .iter()
        .flat_map(|chunk| {
            chunk
                .placeholders()
                .enumerate()
                .map(move |(index, p)| (chunk.seq, index, p))
        })
        .map(|(seq, index, p)| ImageRef {
            id: format!("{seq}-{index}"),
            seq,
            index,
            reference: p.reference.clone(),
            alt: p.alt.clone(),
            source: fetcher.classify(&p.reference),
        })
        .collect()
}

/// Storage key `{prefix}/{document_id}/{seq}-{index}.{ext}`.
///
/// `prefix` and `document_id` are split on `/` and `\`; empty, `.` and `..`
/// segments are dropped, so the key is always relative and never climbs out
/// of the store root.
pub fn upload_key(prefix: &str, document_id: &str, image_id: &str, ext: &str) -> String {
    let file = format!("{image_id}.{ext}");
    [prefix, document_id]
        .into_iter()
        .flat_map(|part| part.split(['/', '\\']))
        .map(str::trim)
        .filter(|seg| !seg.is_empty() && *seg != "." && *seg != "..")
        .chain(std::iter::once(file.as_str()))
        .collect::<Vec<_>>()
        .join("/")
}

impl Enricher {
    /// Fill `chunks[*].images`. Never fails: every problem becomes a
    /// diagnostic in the returned report.
    pub async fn enrich(
        &self,
        document_id: &str,
        chunks: &mut [Chunk],
        fetcher: ImageFetcher,
        deadline: Option<Instant>,
    ) -> EnrichmentReport {
        let refs = collect_image_refs(chunks, &fetcher);
        let total = refs.len();
        let mut report = EnrichmentReport {
            images_found: total,
            ..Default::default()
        };
        if total == 0 {
            debug!("No image placeholders to enrich");
            return report;
        }

        info!(
            "Enriching {} images across {} chunks (concurrency={})",
            total,
            chunks.len(),
            self.concurrency
        );
        self.progress.on_enrichment_start(total);

        let semaphore = Arc::new(Semaphore::new(self.concurrency.max(1)));
        let fetcher = Arc::new(fetcher);
        let mut set = JoinSet::new();
        for (position, image) in refs.iter().enumerate() {
            let task = ImageTask {
                enricher: self.clone(),
                semaphore: Arc::clone(&semaphore),
                fetcher: Arc::clone(&fetcher),
                document_id: document_id.to_string(),
                image: image.clone(),
                total,
            };
            set.spawn(async move { (position, task.run().await) });
        }

        let mut finished: HashMap<usize, ImageOutcome> = HashMap::with_capacity(total);
        let mut aborted: usize = 0;
        let drain = async {
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((position, outcome)) => {
                        finished.insert(position, outcome);
                    }
                    Err(e) => {
                        warn!("Image task ended abnormally: {}", e);
                        aborted += 1;
                    }
                }
            }
        };
        match deadline {
            Some(at) => {
                if timeout_at(at, drain).await.is_err() {
                    report.deadline_hit = true;
                }
            }
            None => drain.await,
        }
        if report.deadline_hit {
            set.abort_all();
            warn!(
                "Deadline reached with {} of {} images unfinished",
                total - finished.len(),
                total
            );
        }
        if aborted > 0 {
            warn!("{} image tasks did not complete", aborted);
        }

        // attach in placeholder order
        for (position, image) in refs.into_iter().enumerate() {
            let outcome = finished.remove(&position);
            // the task itself reported progress only if it ran to the end
            let finished_ok = outcome.is_some();
            let (info, errors) = match outcome {
                Some(outcome) => (outcome.info, outcome.errors),
                None if report.deadline_hit => (
                    None,
                    vec![ImageError::Timeout {
                        image_id: image.id.clone(),
                    }],
                ),
                None => (
                    None,
                    vec![ImageError::Fetch {
                        image_id: image.id.clone(),
                        detail: "image task aborted".into(),
                    }],
                ),
            };
            if !finished_ok {
                for error in &errors {
                    self.progress.on_image_error(&image.id, total, &error.to_string());
                }
            }
            if let Some(info) = info {
                if let Some(chunk) = chunks.get_mut(image.seq) {
                    chunk.images.push(info);
                    report.images_attached += 1;
                }
            }
            report
                .diagnostics
                .extend(errors.into_iter().map(|error| ImageDiagnostic {
                    chunk_seq: image.seq,
                    reference: image.reference.clone(),
                    error,
                }));
        }

        self.progress
            .on_enrichment_complete(total, report.images_attached);
        info!(
            "Enrichment done: {}/{} images attached, {} diagnostics",
            report.images_attached,
            total,
            report.diagnostics.len()
        );
        report
    }
}

/// One spawned unit of work: everything a single image needs, owned.
struct ImageTask {
    enricher: Enricher,
    semaphore: Arc<Semaphore>,
    fetcher: Arc<ImageFetcher>,
    document_id: String,
    image: ImageRef,
    total: usize,
}

impl ImageTask {
    async fn run(self) -> ImageOutcome {
        let id = self.image.id.clone();
        let progress = Arc::clone(&self.enricher.progress);

        let _permit = match Arc::clone(&self.semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                return self.dropped(ImageError::Fetch {
                    image_id: id,
                    detail: e.to_string(),
                })
            }
        };
        progress.on_image_start(&id, self.total);

        let bytes = match self.fetcher.fetch(&self.image.source).await {
            Ok(bytes) => bytes,
            Err(detail) => return self.dropped(ImageError::Fetch { image_id: id, detail }),
        };

        let key = upload_key(
            &self.enricher.path_prefix,
            &self.document_id,
            &id,
            bytes.extension(),
        );
        let url = match self.enricher.store.put(&key, &bytes).await {
            Ok(url) => url,
            Err(detail) => return self.dropped(ImageError::Upload { image_id: id, detail }),
        };

        let ocr = async {
            match self.enricher.ocr {
                Some(ref engine) => engine.recognize(&bytes).await.map(Some),
                None => Ok(None),
            }
        };
        let caption = async {
            match self.enricher.captioner {
                Some(ref captioner) => captioner.caption(&bytes, &self.image.alt).await.map(Some),
                None => Ok(None),
            }
        };
        let (ocr, caption) = tokio::join!(ocr, caption);

        let mut errors = Vec::new();
        let ocr_text = ocr.unwrap_or_else(|detail| {
            warn!("Image {}: OCR failed: {}", id, detail);
            errors.push(ImageError::Ocr {
                image_id: id.clone(),
                detail,
            });
            None
        });
        let caption = caption.unwrap_or_else(|detail| {
            warn!("Image {}: caption failed: {}", id, detail);
            errors.push(ImageError::Caption {
                image_id: id.clone(),
                detail,
            });
            None
        });

        debug!("Image {} stored at {}", id, url);
        progress.on_image_complete(&id, self.total);
        ImageOutcome {
            info: Some(ImageInfo {
                id,
                original_ref: self.image.reference.clone(),
                url,
                ocr_text: ocr_text.unwrap_or_default(),
                caption: caption.unwrap_or_default(),
            }),
            errors,
        }
    }

    fn dropped(&self, error: ImageError) -> ImageOutcome {
        warn!("{}", error);
        self.enricher
            .progress
            .on_image_error(error.image_id(), self.total, &error.to_string());
        ImageOutcome {
            info: None,
            errors: vec![error],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Document;
    use crate::pipeline::{assemble::assemble, segment::segment};
    use crate::progress::{EnrichmentProgressCallback, NoopProgressCallback};
    use crate::services::ImageBytes;
    use async_trait::async_trait;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    const PNG_1X1: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52,
    ];

    fn data_uri() -> String {
        format!("data:image/png;base64,{}", STANDARD.encode(PNG_1X1))
    }

    #[derive(Default)]
    struct MemoryStore {
        keys: Mutex<Vec<String>>,
        fail_on: Option<&'static str>,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl ObjectStorage for MemoryStore {
        async fn put(&self, key: &str, _image: &ImageBytes) -> Result<String, String> {
            if let Some(d) = self.delay {
                tokio::time::sleep(d).await;
            }
            if self.fail_on.is_some_and(|f| key.contains(f)) {
                return Err("HTTP 503".into());
            }
            self.keys.lock().unwrap().push(key.to_string());
            Ok(format!("mem://{key}"))
        }
    }

    struct FixedOcr(Result<&'static str, &'static str>);

    #[async_trait]
    impl OcrEngine for FixedOcr {
        async fn recognize(&self, _image: &ImageBytes) -> Result<String, String> {
            self.0.map(String::from).map_err(String::from)
        }
    }

    struct AltCaptioner;

    #[async_trait]
    impl ImageCaptioner for AltCaptioner {
        async fn caption(&self, _image: &ImageBytes, alt: &str) -> Result<String, String> {
            Ok(format!("caption for {alt}"))
        }
    }

    fn enricher(store: MemoryStore) -> Enricher {
        Enricher {
            store: Arc::new(store),
            ocr: None,
            captioner: None,
            progress: Arc::new(NoopProgressCallback),
            concurrency: 2,
            path_prefix: "p".into(),
        }
    }

    fn chunks_for(text: &str, size: usize) -> Vec<Chunk> {
        assemble(&segment(text), size, 0)
    }

    fn fetcher() -> ImageFetcher {
        ImageFetcher::new(&Document::default(), None, 5).unwrap()
    }

    #[test]
    fn upload_key_layout() {
        assert_eq!(upload_key("imgs/", "doc-1", "0-2", "png"), "imgs/doc-1/0-2.png");
        assert_eq!(upload_key("", "doc-1", "3-0", "jpg"), "doc-1/3-0.jpg");
    }

    #[test]
    fn upload_key_never_leaves_the_root() {
        assert_eq!(upload_key("", "../../escaped", "0-0", "png"), "escaped/0-0.png");
        assert_eq!(upload_key("/abs/./p", "a\\..\\b", "1-0", "png"), "abs/p/a/b/1-0.png");
        assert_eq!(upload_key("..", "..", "0-0", "png"), "0-0.png");
    }

    #[test]
    fn refs_are_numbered_per_chunk() {
        let uri = data_uri();
        let text = format!("![a]({uri}) ![b]({uri})\n\n{}\n\n![c]({uri})", "w".repeat(30));
        let chunks = chunks_for(&text, 40);
        let ids: Vec<_> = collect_image_refs(&chunks, &fetcher())
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids.first().map(String::as_str), Some("0-0"));
        assert!(ids.iter().any(|id| id.ends_with("-0") && id != "0-0"));
        assert_eq!(ids.len(), 3);
    }

    #[tokio::test]
    async fn attaches_images_in_placeholder_order_with_ocr_and_caption() {
        let uri = data_uri();
        let text = format!("before ![one]({uri}) mid ![two]({uri}) after");
        let mut chunks = chunks_for(&text, 2000);
        let mut e = enricher(MemoryStore::default());
        e.ocr = Some(Arc::new(FixedOcr(Ok("text in image"))));
        e.captioner = Some(Arc::new(AltCaptioner));

        let report = e.enrich("doc", &mut chunks, fetcher(), None).await;
        assert_eq!(report.images_attached, 2);
        assert!(report.diagnostics.is_empty());
        let images = &chunks[0].images;
        assert_eq!(images[0].id, "0-0");
        assert_eq!(images[1].id, "0-1");
        assert_eq!(images[0].url, "mem://p/doc/0-0.png");
        assert_eq!(images[1].caption, "caption for two");
        assert_eq!(images[0].ocr_text, "text in image");
    }

    #[tokio::test]
    async fn upload_failure_omits_only_that_image() {
        let uri = data_uri();
        let text = format!("![a]({uri}) ![b]({uri}) ![c]({uri})");
        let mut chunks = chunks_for(&text, 2000);
        let content_before = chunks[0].content.clone();
        let e = enricher(MemoryStore {
            fail_on: Some("0-1"),
            ..Default::default()
        });

        let report = e.enrich("doc", &mut chunks, fetcher(), None).await;
        let ids: Vec<_> = chunks[0].images.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["0-0", "0-2"]);
        assert_eq!(chunks[0].content, content_before);
        assert_eq!(report.images_failed(), 1);
        assert!(matches!(
            report.diagnostics[0].error,
            ImageError::Upload { ref image_id, .. } if image_id == "0-1"
        ));
    }

    #[tokio::test]
    async fn ocr_failure_keeps_image() {
        let uri = data_uri();
        let mut chunks = chunks_for(&format!("![x]({uri})"), 2000);
        let mut e = enricher(MemoryStore::default());
        e.ocr = Some(Arc::new(FixedOcr(Err("engine crashed"))));

        let report = e.enrich("doc", &mut chunks, fetcher(), None).await;
        assert_eq!(report.images_attached, 1);
        assert_eq!(chunks[0].images[0].ocr_text, "");
        assert!(matches!(report.diagnostics[0].error, ImageError::Ocr { .. }));
    }

    #[tokio::test]
    async fn unresolvable_reference_is_a_fetch_diagnostic() {
        let mut chunks = chunks_for("![gone](/definitely/not/here.png)", 2000);
        let e = enricher(MemoryStore::default());
        let report = e.enrich("doc", &mut chunks, fetcher(), None).await;
        assert!(chunks[0].images.is_empty());
        assert_eq!(report.diagnostics[0].chunk_seq, 0);
        assert_eq!(report.diagnostics[0].reference, "/definitely/not/here.png");
        assert!(matches!(report.diagnostics[0].error, ImageError::Fetch { .. }));
    }

    #[tokio::test]
    async fn deadline_abandons_slow_images() {
        let uri = data_uri();
        let mut chunks = chunks_for(&format!("![a]({uri}) ![b]({uri})"), 2000);
        let e = enricher(MemoryStore {
            delay: Some(Duration::from_secs(30)),
            ..Default::default()
        });
        let deadline = Instant::now() + Duration::from_millis(50);

        let report = e.enrich("doc", &mut chunks, fetcher(), Some(deadline)).await;
        assert!(report.deadline_hit);
        assert!(chunks[0].images.is_empty());
        assert_eq!(report.diagnostics.len(), 2);
        assert!(report
            .diagnostics
            .iter()
            .all(|d| matches!(d.error, ImageError::Timeout { .. })));
    }

    #[derive(Default)]
    struct CountingProgress {
        started: AtomicUsize,
        image_started: AtomicUsize,
        completed: AtomicUsize,
        errored: AtomicUsize,
        finished: Mutex<Option<(usize, usize)>>,
    }

    impl EnrichmentProgressCallback for CountingProgress {
        fn on_enrichment_start(&self, total_images: usize) {
            self.started.fetch_add(total_images, Ordering::SeqCst);
        }
        fn on_image_start(&self, _image_id: &str, _total: usize) {
            self.image_started.fetch_add(1, Ordering::SeqCst);
        }
        fn on_image_complete(&self, _image_id: &str, _total: usize) {
            self.completed.fetch_add(1, Ordering::SeqCst);
        }
        fn on_image_error(&self, _image_id: &str, _total: usize, _error: &str) {
            self.errored.fetch_add(1, Ordering::SeqCst);
        }
        fn on_enrichment_complete(&self, total_images: usize, attached: usize) {
            *self.finished.lock().unwrap() = Some((total_images, attached));
        }
    }

    #[tokio::test]
    async fn progress_events_cover_every_image() {
        let uri = data_uri();
        let text = format!("![a]({uri}) ![b]({uri}) ![c](/no/such/file.png)");
        let mut chunks = chunks_for(&text, 2000);
        let progress = Arc::new(CountingProgress::default());
        let mut e = enricher(MemoryStore {
            fail_on: Some("0-1"),
            ..Default::default()
        });
        e.progress = progress.clone();

        e.enrich("doc", &mut chunks, fetcher(), None).await;
        assert_eq!(progress.started.load(Ordering::SeqCst), 3);
        assert_eq!(progress.image_started.load(Ordering::SeqCst), 3);
        assert_eq!(progress.completed.load(Ordering::SeqCst), 1);
        assert_eq!(progress.errored.load(Ordering::SeqCst), 2);
        assert_eq!(*progress.finished.lock().unwrap(), Some((3, 1)));
    }

    #[tokio::test]
    async fn timed_out_images_report_progress_errors() {
        let uri = data_uri();
        let mut chunks = chunks_for(&format!("![a]({uri}) ![b]({uri})"), 2000);
        let progress = Arc::new(CountingProgress::default());
        let mut e = enricher(MemoryStore {
            delay: Some(Duration::from_secs(30)),
            ..Default::default()
        });
        e.progress = progress.clone();
        let deadline = Instant::now() + Duration::from_millis(50);

        let report = e.enrich("doc", &mut chunks, fetcher(), Some(deadline)).await;
        assert_eq!(report.images_failed(), 2);
        assert_eq!(progress.completed.load(Ordering::SeqCst), 0);
        assert_eq!(progress.errored.load(Ordering::SeqCst), 2);
        assert_eq!(*progress.finished.lock().unwrap(), Some((2, 0)));
    }

    #[tokio::test]
    async fn no_placeholders_is_a_no_op() {
        let mut chunks = chunks_for("just words", 100);
        let report = enricher(MemoryStore::default())
            .enrich("doc", &mut chunks, fetcher(), None)
            .await;
        assert_eq!(report.images_found, 0);
        assert!(chunks[0].images.is_empty());
    }
}
