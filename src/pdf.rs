//! Single-page PDF authoring and ordered page merging.
//!
//! Uploaded page images become one-page A4 PDFs (scale-to-fit, never
//! cropped); accepted pages are merged back into one final document in
//! page order.

use std::collections::BTreeMap;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use thiserror::Error;

pub const A4_WIDTH_PT: f64 = 595.0;
pub const A4_HEIGHT_PT: f64 = 842.0;

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("pdf processing failed: {0}")]
    Lopdf(#[from] lopdf::Error),
    #[error("pdf io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no input documents to merge")]
    EmptyInput,
    #[error("merged input is missing a page tree")]
    MissingPageTree,
}

/// Scale-to-fit inside an A4 page: pin the width, derive the height from
/// the aspect ratio, and clamp to the page height when the image is taller
/// than it is wide. The image is never cropped and never exceeds the page.
pub fn fit_to_a4(width: u32, height: u32) -> (f64, f64) {
    let ratio = f64::from(height) / f64::from(width);
    let mut draw_width = A4_WIDTH_PT;
    let mut draw_height = draw_width * ratio;
    if draw_height > A4_HEIGHT_PT {
        draw_height = A4_HEIGHT_PT;
        draw_width = draw_height / ratio;
    }
    (draw_width, draw_height)
}

/// Wraps a JPEG into a one-page A4 PDF, centered and scaled to fit.
pub fn jpeg_to_pdf(jpeg: &[u8], width: u32, height: u32) -> Result<Vec<u8>, PdfError> {
    let (draw_width, draw_height) = fit_to_a4(width, height);
    let offset_x = (A4_WIDTH_PT - draw_width) / 2.0;
    let offset_y = (A4_HEIGHT_PT - draw_height) / 2.0;

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        jpeg.to_vec(),
    ));

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    draw_width.into(),
                    0.0.into(),
                    0.0.into(),
                    draw_height.into(),
                    offset_x.into(),
                    offset_y.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

    let resources_id = doc.add_object(dictionary! {
        "XObject" => dictionary! { "Im0" => image_id },
    });

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.0.into(), 0.0.into(), A4_WIDTH_PT.into(), A4_HEIGHT_PT.into()],
        "Contents" => content_id,
        "Resources" => resources_id,
    });

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out)?;
    Ok(out)
}

/// Concatenates the inputs into one document, preserving input order and
/// the page order within each input. Any unreadable input aborts the whole
/// merge; no partial output is produced.
pub fn merge_pdfs(inputs: &[Vec<u8>]) -> Result<Vec<u8>, PdfError> {
    if inputs.is_empty() {
        return Err(PdfError::EmptyInput);
    }

    let mut max_id = 1;
    let mut page_ids: Vec<ObjectId> = Vec::new();
    let mut page_objects: BTreeMap<ObjectId, Object> = BTreeMap::new();
    let mut all_objects: BTreeMap<ObjectId, Object> = BTreeMap::new();

    for bytes in inputs {
        let mut doc = Document::load_mem(bytes)?;
        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        for (_page_number, object_id) in doc.get_pages() {
            page_ids.push(object_id);
            page_objects.insert(object_id, doc.get_object(object_id)?.to_owned());
        }
        all_objects.extend(doc.objects);
    }

    let mut document = Document::with_version("1.5");
    let mut catalog_object: Option<(ObjectId, Object)> = None;
    let mut pages_object: Option<(ObjectId, Object)> = None;

    for (object_id, object) in all_objects.iter() {
        match dictionary_type(object) {
            Some(b"Catalog") => {
                if catalog_object.is_none() {
                    catalog_object = Some((*object_id, object.clone()));
                }
            }
            Some(b"Pages") => {
                if let Ok(dictionary) = object.as_dict() {
                    let mut dictionary = dictionary.clone();
                    if let Some((_, ref existing)) = pages_object {
                        if let Ok(existing) = existing.as_dict() {
                            dictionary.extend(existing);
                        }
                    }
                    pages_object = Some((*object_id, Object::Dictionary(dictionary)));
                }
            }
            // Page objects are re-inserted below with a fixed parent;
            // outlines are dropped entirely.
            Some(b"Page") | Some(b"Outlines") | Some(b"Outline") => {}
            _ => {
                document.objects.insert(*object_id, object.clone());
            }
        }
    }

    let (pages_id, pages_root) = pages_object.ok_or(PdfError::MissingPageTree)?;
    let (catalog_id, catalog_root) = catalog_object.ok_or(PdfError::MissingPageTree)?;

    for object_id in &page_ids {
        if let Some(object) = page_objects.get(object_id) {
            if let Ok(dictionary) = object.as_dict() {
                let mut dictionary = dictionary.clone();
                dictionary.set("Parent", pages_id);
                document
                    .objects
                    .insert(*object_id, Object::Dictionary(dictionary));
            }
        }
    }

    if let Ok(dictionary) = pages_root.as_dict() {
        let mut dictionary = dictionary.clone();
        dictionary.set("Count", page_ids.len() as i64);
        dictionary.set(
            "Kids",
            page_ids
                .iter()
                .map(|id| Object::Reference(*id))
                .collect::<Vec<Object>>(),
        );
        document
            .objects
            .insert(pages_id, Object::Dictionary(dictionary));
    }

    if let Ok(dictionary) = catalog_root.as_dict() {
        let mut dictionary = dictionary.clone();
        dictionary.set("Pages", pages_id);
        dictionary.remove(b"Outlines");
        document
            .objects
            .insert(catalog_id, Object::Dictionary(dictionary));
    }

    document.trailer.set("Root", catalog_id);
    document.max_id = document.objects.len() as u32;
    document.renumber_objects();
    document.compress();

    let mut out = Vec::new();
    document.save_to(&mut out)?;
    Ok(out)
}

fn dictionary_type(object: &Object) -> Option<&[u8]> {
    object
        .as_dict()
        .ok()
        .and_then(|dictionary| dictionary.get(b"Type").ok())
        .and_then(|value| value.as_name().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging;
    use image::{Rgb, RgbImage};

    fn sample_jpeg(value: u8) -> (Vec<u8>, u32, u32) {
        let image = RgbImage::from_pixel(8, 4, Rgb([value, value, value]));
        (imaging::encode_jpeg(&image).unwrap(), 8, 4)
    }

    #[test]
    fn wide_images_pin_the_page_width() {
        let (width, height) = fit_to_a4(2000, 1000);
        assert_eq!(width, 595.0);
        assert_eq!(height, 297.5);
    }

    #[test]
    fn tall_images_clamp_to_the_page_height() {
        let (width, height) = fit_to_a4(1000, 2000);
        assert_eq!(height, 842.0);
        assert_eq!(width, 421.0);
        assert!(width <= A4_WIDTH_PT);
    }

    #[test]
    fn jpeg_becomes_a_single_a4_page() {
        let (jpeg, width, height) = sample_jpeg(120);
        let bytes = jpeg_to_pdf(&jpeg, width, height).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn merge_preserves_input_order() {
        let inputs: Vec<Vec<u8>> = [10u8, 20, 30]
            .iter()
            .map(|value| {
                let (jpeg, width, height) = sample_jpeg(*value);
                jpeg_to_pdf(&jpeg, width, height).unwrap()
            })
            .collect();
        let jpegs: Vec<Vec<u8>> = [10u8, 20, 30]
            .iter()
            .map(|value| sample_jpeg(*value).0)
            .collect();

        let merged = merge_pdfs(&inputs).unwrap();
        let doc = Document::load_mem(&merged).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 3);

        for ((_, page_id), expected) in pages.iter().zip(jpegs.iter()) {
            let image = embedded_image(&doc, *page_id);
            assert_eq!(&image, expected);
        }
    }

    #[test]
    fn merging_nothing_is_an_error() {
        assert!(matches!(merge_pdfs(&[]), Err(PdfError::EmptyInput)));
    }

    #[test]
    fn corrupt_input_aborts_the_merge() {
        let (jpeg, width, height) = sample_jpeg(50);
        let good = jpeg_to_pdf(&jpeg, width, height).unwrap();
        let result = merge_pdfs(&[good, b"not a pdf".to_vec()]);
        assert!(result.is_err());
    }

    fn embedded_image(doc: &Document, page_id: ObjectId) -> Vec<u8> {
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
}
