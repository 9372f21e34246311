// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Uploads into textures whose row pitch matches or exceeds the tight stride.

use frames_and_textures::SoftwareContext;
use frames_and_textures::cache::ResourceCache;
use frames_and_textures::config::FrameConfig;
use frames_and_textures::context::Capability;
use frames_and_textures::ingest::FrameIngestor;
use frames_and_textures::pixel_formats::{BGRX8Pixel, BGRX8UNorm, pixel_as_bytes};
use frames_and_textures::producer::LoopbackProducer;
use frames_and_textures::staging::StagingBuffer;
use frames_and_textures::upload::{RefreshOutcome, UploadEngine};
use std::sync::Arc;

/// A frame where every pixel encodes its position, so misplaced rows are visible.
fn gradient(config: &FrameConfig<'_>) -> Vec<BGRX8Pixel> {
    let mut pixels = Vec::with_capacity(config.width as usize * config.height as usize);
    for y in 0..config.height {
        for x in 0..config.width {
            pixels.push(BGRX8Pixel {
                b: x as u8,
                g: y as u8,
                r: (x ^ y) as u8,
                x: 0xFF,
            });
        }
    }
    pixels
}

fn upload_with_alignment(
    config: &FrameConfig<'_>,
    capability: Capability,
    alignment: usize,
) -> (Vec<u8>, usize, Vec<u8>) {
    let staging = Arc::new(StagingBuffer::<BGRX8UNorm>::new(config));
    let ingestor = FrameIngestor::new(staging.clone());
    let engine = UploadEngine::new(staging.clone());
    let cache = ResourceCache::<SoftwareContext, BGRX8UNorm>::new(config);
    let producer = Arc::new(LoopbackProducer::new());
    let _subscription = ingestor.subscribe(producer.clone());
    let context = SoftwareContext::with_row_alignment(capability, alignment);

    let frame = gradient(config);
    producer.deliver_pixels::<BGRX8UNorm>(1, &frame);
    assert_eq!(
        engine.refresh(true, &cache, &context).unwrap(),
        RefreshOutcome::Uploaded { frame_index: 1 }
    );
    let view = cache.lookup(&context).unwrap();
    let result = (view.pitched_bytes(), view.pitch(), pixel_as_bytes(&frame).to_vec());
    cache.destroy(&context);
    result
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn pitch_equal_to_tight_stride_is_byte_identical() {
    //640 * 4 is already a multiple of 256
    let config = FrameConfig::KINECT_COLOR;
    let (pitched, pitch, frame) = upload_with_alignment(&config, Capability::Standard, 256);
    assert_eq!(pitch, config.tight_stride::<BGRX8UNorm>());
    assert_eq!(pitched, frame);
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn padded_rows_keep_their_prefix() {
    let config = FrameConfig {
        width: 65,
        height: 7,
        debug_name: "odd",
    };
    for capability in [Capability::Standard, Capability::Extended] {
        let (pitched, pitch, frame) = upload_with_alignment(&config, capability, 256);
        let tight = config.tight_stride::<BGRX8UNorm>();
        assert_eq!(tight, 260);
        assert_eq!(pitch, 512);
        assert_eq!(pitched.len(), pitch * config.height as usize);
        for (row, expected) in frame.chunks_exact(tight).enumerate() {
            let start = row * pitch;
            assert_eq!(&pitched[start..start + tight], expected, "row {row}");
        }
    }
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn small_alignment_padding() {
    let config = FrameConfig {
        width: 3,
        height: 3,
        debug_name: "tiny",
    };
    let (pitched, pitch, frame) = upload_with_alignment(&config, Capability::Extended, 16);
    assert_eq!(pitch, 16);
    for row in 0..3 {
        assert_eq!(&pitched[row * 16..row * 16 + 12], &frame[row * 12..row * 12 + 12]);
    }
}
