//! Picture extraction: pull every embedded image object out of the
//! selected pages via pdfium.
//!
//! pdfium is not async-safe, so all work here runs on the blocking pool
//! through `spawn_blocking`. Each call binds its own `Pdfium` instance.

use crate::config::{PageSelection, PipelineConfig};
use crate::error::PicDescError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// An image found on a page.
#[derive(Debug, Clone)]
pub struct ExtractedPicture {
    /// 1-indexed page number.
    pub page_num: usize,
    /// Position among the pictures kept on this page.
    pub index: usize,
    pub image: DynamicImage,
}

/// Everything extraction found.
#[derive(Debug, Default)]
pub struct Extraction {
    pub total_pages: usize,
    pub scanned_pages: usize,
    pub pictures: Vec<ExtractedPicture>,
}

/// Extract pictures from the pages selected in `config`.
pub async fn extract_pictures(
    pdf_path: &Path,
    config: &PipelineConfig,
) -> Result<Extraction, PicDescError> {
    let path = pdf_path.to_path_buf();
    let lib_path = config.pdfium_lib_path.clone();
    let password = config.password.clone();
    let selection = config.pages.clone();
    let min_pixels = config.min_picture_pixels;

    tokio::task::spawn_blocking(move || {
        let pdfium = bind_pdfium(lib_path.as_deref())?;
        extract_blocking(&pdfium, &path, password.as_deref(), &selection, min_pixels)
    })
    .await
    .map_err(|e| PicDescError::Internal(format!("Extraction task panicked: {}", e)))?
}

/// Bind pdfium from an explicit file or directory, or from the system loader.
pub fn bind_pdfium(lib_path: Option<&Path>) -> Result<Pdfium, PicDescError> {
    let bindings = match lib_path {
        Some(dir) if dir.is_dir() => {
            Pdfium::bind_to_library(dir.join(Pdfium::pdfium_platform_library_name()))
        }
        Some(file) => Pdfium::bind_to_library(file),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| PicDescError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

fn extract_blocking(
    pdfium: &Pdfium,
    pdf_path: &Path,
    password: Option<&str>,
    selection: &PageSelection,
    min_pixels: u32,
) -> Result<Extraction, PicDescError> {
    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| load_error(pdf_path, password.is_some(), e))?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    let indices = selection.to_indices(total_pages);
    if indices.is_empty() {
        return Err(PicDescError::PageOutOfRange {
            page: first_requested_page(selection),
            total: total_pages,
        });
    }

    let mut pictures = Vec::new();

    for &idx in &indices {
        let page_num = idx + 1;
        let page = pages
            .get(idx as u16)
            .map_err(|e| PicDescError::ExtractionFailed {
                page: page_num,
                detail: format!("{:?}", e),
            })?;

        let mut kept = 0usize;
        for (object_idx, object) in page.objects().iter().enumerate() {
            let Some(image_object) = object.as_image_object() else {
                continue;
            };

            let image = match image_object.get_raw_image() {
                Ok(img) => img,
                Err(e) => {
                    warn!(
                        "Page {}: skipping unreadable image object {}: {:?}",
                        page_num, object_idx, e
                    );
                    continue;
                }
            };

            if !large_enough(&image, min_pixels) {
                debug!(
                    "Page {}: skipping {}x{} image object {}",
                    page_num,
                    image.width(),
                    image.height(),
                    object_idx
                );
                continue;
            }

            pictures.push(ExtractedPicture {
                page_num,
                index: kept,
                image,
            });
            kept += 1;
        }

        debug!("Page {}: {} pictures", page_num, kept);
    }

    Ok(Extraction {
        total_pages,
        scanned_pages: indices.len(),
        pictures,
    })
}

/// Whether the shorter edge reaches `min_pixels`.
pub fn large_enough(image: &DynamicImage, min_pixels: u32) -> bool {
    image.width().min(image.height()) >= min_pixels
}

fn first_requested_page(selection: &PageSelection) -> usize {
    match selection {
        PageSelection::All => 0,
        PageSelection::Single(p) => *p,
        PageSelection::Range(start, _) => *start,
        PageSelection::Set(pages) => pages.iter().copied().min().unwrap_or(0),
    }
}

fn load_error(path: &Path, had_password: bool, e: PdfiumError) -> PicDescError {
    let detail = format!("{:?}", e);
    let path: PathBuf = path.to_path_buf();
    if detail.to_ascii_lowercase().contains("password") {
        if had_password {
            PicDescError::WrongPassword { path }
        } else {
            PicDescError::PasswordRequired { path }
        }
    } else {
        PicDescError::CorruptPdf { path, detail }
    }
}
