use image::{Rgb, RgbImage};
use parkwatch::config::PreprocessConfig;
use parkwatch::evaluator::{count_foreground, SlotEvaluator};
use parkwatch::preprocess::{Preprocessor, FOREGROUND};
use parkwatch::slots::{Slot, SlotLayout};
use parkwatch::DetectError;

/// Flat grey lot with a striped "car" at (20, 20) covering one 107x48 slot.
fn lot_with_one_car() -> RgbImage {
    let mut frame = RgbImage::from_pixel(400, 200, Rgb([128, 128, 128]));
    for y in 20..68 {
        for x in 20..127 {
            let dark = (x / 4) % 2 == 0;
            let v = if dark { 0 } else { 255 };
            frame.put_pixel(x, y, Rgb([v, v, v]));
        }
    }
    frame
}

#[test]
fn output_is_binary_and_same_size() {
    let frame = lot_with_one_car();
    let map = Preprocessor::default().process(&frame);

    assert_eq!(map.dimensions(), frame.dimensions());
    assert!(map.pixels().all(|p| p.0[0] == 0 || p.0[0] == FOREGROUND));
}

#[test]
fn preprocessing_is_deterministic() {
    let mut frame = RgbImage::new(160, 120);
    for (x, y, p) in frame.enumerate_pixels_mut() {
        let v = ((x * 37 + y * 91) ^ (x * y)) % 256;
        *p = Rgb([v as u8, (v as u8).wrapping_mul(3), 255 - v as u8]);
    }

    let preprocessor = Preprocessor::default();
    let first = preprocessor.process(&frame);
    let second = preprocessor.process(&frame);
    assert_eq!(first.as_raw(), second.as_raw());

    let third = Preprocessor::new(PreprocessConfig::default()).unwrap().process(&frame);
    assert_eq!(first.as_raw(), third.as_raw());
}

#[test]
fn black_frame_has_no_foreground() {
    let map = Preprocessor::default().process(&RgbImage::new(320, 240));
    assert!(map.pixels().all(|p| p.0[0] == 0));
}

#[test]
fn textured_slot_reads_occupied_and_flat_slot_free() {
    let frame = lot_with_one_car();
    let map = Preprocessor::default().process(&frame);

    let occupied = count_foreground(&map, 20, 20, 107, 48);
    let empty = count_foreground(&map, 250, 120, 107, 48);
    assert!(occupied >= 900, "striped slot only had {} foreground pixels", occupied);
    assert_eq!(empty, 0);

    let layout = SlotLayout {
        image_width: 400,
        image_height: 200,
        slot_width: 107,
        slot_height: 48,
        slots: vec![Slot::new(20, 20), Slot::new(250, 120)],
    };
    let result = SlotEvaluator::default().evaluate(&map, &layout);
    assert_eq!(result.free_count, 1);
    assert!(!result.per_slot[0].is_free);
    assert!(result.per_slot[1].is_free);
}

#[test]
fn isolated_dark_pixel_is_cleaned_away() {
    let mut frame = RgbImage::from_pixel(60, 60, Rgb([128, 128, 128]));
    frame.put_pixel(30, 30, Rgb([0, 0, 0]));

    let map = Preprocessor::default().process(&frame);
    assert!(map.pixels().all(|p| p.0[0] == 0));
}

#[test]
fn dilation_grows_foreground_past_the_median_output() {
    let frame = lot_with_one_car();
    let no_dilation = PreprocessConfig {
        dilate_iterations: 0,
        ..PreprocessConfig::default()
    };
    let thin = Preprocessor::new(no_dilation).unwrap().process(&frame);
    let grown = Preprocessor::default().process(&frame);

    let thin_count = count_foreground(&thin, 0, 0, 400, 200);
    let grown_count = count_foreground(&grown, 0, 0, 400, 200);
    assert!(grown_count > thin_count);
    // Dilation never removes foreground.
    for (t, g) in thin.pixels().zip(grown.pixels()) {
        assert!(t.0[0] == 0 || g.0[0] == FOREGROUND);
    }
}

#[test]
fn invalid_kernels_are_rejected() {
    let even_block = PreprocessConfig {
        block_size: 24,
        ..PreprocessConfig::default()
    };
    assert!(matches!(
        Preprocessor::new(even_block),
        Err(DetectError::InvalidConfig(_))
    ));

    let zero_median = PreprocessConfig {
        median_kernel: 0,
        ..PreprocessConfig::default()
    };
    assert!(Preprocessor::new(zero_median).is_err());

    let bad_sigma = PreprocessConfig {
        blur_sigma: -1.0,
        ..PreprocessConfig::default()
    };
    assert!(Preprocessor::new(bad_sigma).is_err());

    let even_dilation = PreprocessConfig {
        dilate_kernel: 4,
        ..PreprocessConfig::default()
    };
    assert!(Preprocessor::new(even_dilation).is_err());
}
