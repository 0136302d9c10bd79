//! Request orchestration.

mod image_service;

pub use image_service::{ImageService, RenderOutcome, Rendition, ServiceSettings, TEE_CHUNK_SIZE};
