mod common;

use chrono::Utc;
use collector::imaging;
use collector::models::Page;
use collector::paths;
use collector::pdf;
use collector::storage::ObjectStorage;
use collector::workers::stitch::{assemble_document, page_pdf_source};
use common::FakeStorage;
use image::{Rgb, RgbImage};
use lopdf::{Document, Object};
use uuid::Uuid;

struct Fixture {
    company_id: Uuid,
    dashboard_id: Uuid,
    applicant_id: Uuid,
    form_id: Uuid,
    doc_id: Uuid,
}

impl Fixture {
    fn new() -> Self {
        Fixture {
            company_id: Uuid::new_v4(),
            dashboard_id: Uuid::new_v4(),
            applicant_id: Uuid::new_v4(),
            form_id: Uuid::new_v4(),
            doc_id: Uuid::new_v4(),
        }
    }

    fn page(&self, name: &str, page_number: i32, submission_count: i32, format: &str) -> Page {
        let now = Utc::now().naive_utc();
        Page {
            id: Uuid::new_v4(),
            company_id: self.company_id,
            dashboard_id: self.dashboard_id,
            applicant_id: self.applicant_id,
            form_id: self.form_id,
            doc_id: self.doc_id,
            name: name.to_string(),
            page_number,
            submitted_format: format.to_string(),
            submitted_size: 1024,
            submission_count,
            image_properties: None,
            created_at: now,
            updated_at: now,
        }
    }
}

fn page_pdf(value: u8) -> (Vec<u8>, Vec<u8>) {
    let image = RgbImage::from_pixel(8, 4, Rgb([value, value, value]));
    let jpeg = imaging::encode_jpeg(&image).unwrap();
    let pdf = pdf::jpeg_to_pdf(&jpeg, 8, 4).unwrap();
    (pdf, jpeg)
}

/// The generation filter is what keeps resubmitted documents clean: pages
/// from an older submission must never appear in the stitched output.
#[tokio::test]
async fn stitches_only_the_current_generation_in_page_order() {
    let fixture = Fixture::new();
    let storage = FakeStorage::default();

    let mut current_pages = Vec::new();
    let mut expected_jpegs = Vec::new();
    for (index, value) in [10u8, 20, 30].iter().enumerate() {
        let page = fixture.page(&format!("passport-{index}"), index as i32 + 1, 2, "image/jpeg");
        let (pdf_bytes, jpeg) = page_pdf(*value);
        storage
            .put_object(&page_pdf_source(&page), pdf_bytes, None, None)
            .await
            .unwrap();
        current_pages.push(page);
        expected_jpegs.push(jpeg);
    }

    // Two stale pages from generation 1 sit right next to them in storage.
    for (index, value) in [200u8, 210].iter().enumerate() {
        let page = fixture.page(&format!("passport-old-{index}"), index as i32 + 1, 1, "image/jpeg");
        let (pdf_bytes, _) = page_pdf(*value);
        storage
            .put_object(&page_pdf_source(&page), pdf_bytes, None, None)
            .await
            .unwrap();
    }

    // The worker selects by (doc, generation) ordered by page number; the
    // stale rows never make it into the source list.
    let sources: Vec<String> = current_pages.iter().map(page_pdf_source).collect();
    let merged = assemble_document(&storage, &sources).await.unwrap();

    let doc = Document::load_mem(&merged).unwrap();
    let pages = doc.get_pages();
    assert_eq!(pages.len(), 3);
    for ((_, page_id), expected) in pages.iter().zip(expected_jpegs.iter()) {
        assert_eq!(&embedded_image(&doc, *page_id), expected);
    }
}

#[tokio::test]
async fn pdf_submissions_stitch_from_the_originals_folder() {
    let fixture = Fixture::new();

    let image_page = fixture.page("scan", 1, 1, "image/jpeg");
    assert_eq!(
        page_pdf_source(&image_page),
        paths::fixed_doc_path(
            fixture.company_id,
            fixture.dashboard_id,
            fixture.applicant_id,
            "scan.pdf"
        )
    );

    let pdf_page = fixture.page("contract", 2, 1, "application/pdf");
    assert_eq!(
        page_pdf_source(&pdf_page),
        paths::original_doc_path(
            fixture.company_id,
            fixture.dashboard_id,
            fixture.applicant_id,
            "contract.pdf"
        )
    );
}

#[tokio::test]
async fn a_missing_page_aborts_the_whole_stitch() {
    let fixture = Fixture::new();
    let storage = FakeStorage::default();

    let first = fixture.page("passport-0", 1, 1, "image/jpeg");
    let (pdf_bytes, _) = page_pdf(50);
    storage
        .put_object(&page_pdf_source(&first), pdf_bytes, None, None)
        .await
        .unwrap();

    let missing = fixture.page("passport-1", 2, 1, "image/jpeg");
    let sources = vec![page_pdf_source(&first), page_pdf_source(&missing)];

    let result = assemble_document(&storage, &sources).await;
    let err = result.unwrap_err();
    assert!(err.contains("passport-1"), "error should name the missing page: {err}");

    // Nothing was written anywhere: the bucket still holds only the one
    // source page.
    assert_eq!(storage.object_count().await, 1);
}

#[tokio::test]
async fn fixed_pipeline_output_survives_a_stitch_round_trip() {
    let fixture = Fixture::new();
    let storage = FakeStorage::default();

    // Simulate the upload pipeline: raw image -> standard fix -> A4 pdf.
    let raw = RgbImage::from_fn(64, 48, |x, y| {
        let value = ((x + y) % 200) as u8;
        Rgb([value, value, value / 2])
    });
    let fixed = imaging::apply_adjustments(raw, &imaging::ImageAdjustments::standard()).unwrap();
    let jpeg = imaging::encode_jpeg(&fixed).unwrap();
    let single = pdf::jpeg_to_pdf(&jpeg, fixed.width(), fixed.height()).unwrap();

    let page = fixture.page("license", 1, 3, "image/jpeg");
    storage
        .put_object(
            &page_pdf_source(&page),
            single,
            Some("application/pdf".into()),
            None,
        )
        .await
        .unwrap();

    let merged = assemble_document(&storage, &[page_pdf_source(&page)])
        .await
        .unwrap();
    let doc = Document::load_mem(&merged).unwrap();
    assert_eq!(doc.get_pages().len(), 1);
}

fn embedded_image(doc: &Document, page_id: (u32, u16)) -> Vec<u8> {
    let page = doc.get_object(page_id).unwrap().as_dict().unwrap();
    let resources = resolve_dict(doc, page.get(b"Resources").unwrap());
    let xobjects = resolve_dict(doc, resources.get(b"XObject").unwrap());
    let (_, image_ref) = xobjects.iter().next().unwrap();
    let image_id = image_ref.as_reference().unwrap();
    doc.get_object(image_id)
        .unwrap()
        .as_stream()
        .unwrap()
        .content
        .clone()
}

fn resolve_dict<'a>(doc: &'a Document, object: &'a Object) -> &'a lopdf::Dictionary {
    match object {
        Object::Reference(id) => doc.get_object(*id).unwrap().as_dict().unwrap(),
        other => other.as_dict().unwrap(),
    }
}
