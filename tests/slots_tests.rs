use image::{Rgb, RgbImage};
use parkwatch::slots::{parse_layout, Slot, SlotLayout, SlotPicker, SlotStore};
use parkwatch::DetectError;
use std::fs;
use tempfile::tempdir;

fn sample_layout() -> SlotLayout {
    SlotLayout {
        image_width: 1100,
        image_height: 720,
        slot_width: 107,
        slot_height: 48,
        slots: vec![
            Slot::new(50, 95),
            Slot::new(50, 143),
            Slot::new(50, 191),
            Slot::new(158, 95),
            Slot::new(905, 0),
        ],
    }
}

#[test]
fn missing_store_loads_as_empty_layout() {
    let dir = tempdir().unwrap();
    let store = SlotStore::new(dir.path().join("slots.json"), 107, 48);

    let layout = store.load();
    assert!(layout.is_empty());
    assert_eq!((layout.slot_width, layout.slot_height), (107, 48));
    assert!(!layout.has_reference_dimensions());
}

#[test]
fn corrupt_store_loads_as_empty_layout() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("slots.json");
    fs::write(&path, b"\x80\x04\x95 definitely not json").unwrap();

    let layout = SlotStore::new(&path, 107, 48).load();
    assert!(layout.is_empty());
}

#[test]
fn save_then_load_returns_same_layout() {
    let dir = tempdir().unwrap();
    let store = SlotStore::new(dir.path().join("slots.json"), 107, 48);

    store.save(&sample_layout()).unwrap();
    assert_eq!(store.load(), sample_layout());
    // No temp file left behind after the swap.
    let names: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(names.len(), 1);
}

#[test]
fn export_and_import_preserve_slot_order() {
    let dir = tempdir().unwrap();
    let source = SlotStore::new(dir.path().join("a.json"), 107, 48);
    let target = SlotStore::new(dir.path().join("b.json"), 60, 30);
    source.save(&sample_layout()).unwrap();

    let transfer = dir.path().join("CarParkPos.json");
    let exported = source.export(&transfer).unwrap();
    assert_eq!(exported, sample_layout());

    let imported = target.import(&transfer).unwrap();
    assert_eq!(imported.slots, sample_layout().slots);
    assert_eq!(target.load(), sample_layout());
}

#[test]
fn export_of_corrupt_store_fails_without_writing() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("slots.json");
    fs::write(&path, "{ half a layout").unwrap();
    let store = SlotStore::new(&path, 107, 48);

    let transfer = dir.path().join("transfer.json");
    assert!(store.export(&transfer).is_err());
    assert!(!transfer.exists());
}

#[test]
fn export_of_missing_store_writes_empty_layout() {
    let dir = tempdir().unwrap();
    let store = SlotStore::new(dir.path().join("slots.json"), 107, 48);

    let transfer = dir.path().join("transfer.json");
    let exported = store.export(&transfer).unwrap();
    assert!(exported.is_empty());
    assert_eq!(parse_layout(&fs::read(&transfer).unwrap(), 1, 1).unwrap(), exported);
}

#[test]
fn import_replaces_rather_than_merges() {
    let dir = tempdir().unwrap();
    let store = SlotStore::new(dir.path().join("slots.json"), 107, 48);
    store.save(&sample_layout()).unwrap();

    let transfer = dir.path().join("other.json");
    fs::write(&transfer, "[[1, 2], [3, 4]]").unwrap();
    let imported = store.import(&transfer).unwrap();

    assert_eq!(imported.slots, vec![Slot::new(1, 2), Slot::new(3, 4)]);
    assert_eq!(store.load().len(), 2);
}

#[test]
fn failed_import_keeps_active_layout() {
    let dir = tempdir().unwrap();
    let store = SlotStore::new(dir.path().join("slots.json"), 107, 48);
    store.save(&sample_layout()).unwrap();

    let garbage = dir.path().join("garbage.json");
    fs::write(&garbage, "{ nope").unwrap();
    assert!(store.import(&garbage).is_err());
    assert!(store.import(dir.path().join("absent.json")).is_err());
    assert_eq!(store.load(), sample_layout());
}

#[test]
fn legacy_coordinate_list_gets_default_size() {
    let layout = parse_layout(b"[[10, 20], [30, 40]]", 107, 48).unwrap();
    assert_eq!(layout.slots, vec![Slot::new(10, 20), Slot::new(30, 40)]);
    assert_eq!((layout.slot_width, layout.slot_height), (107, 48));
    assert_eq!((layout.image_width, layout.image_height), (0, 0));

    assert!(parse_layout(br#"{"slot_width": 0, "slot_height": 48}"#, 107, 48).is_err());
}

#[test]
fn picker_rejects_slots_outside_reference_image() {
    let mut picker = SlotPicker::new((640, 480), 107, 48).unwrap();
    picker.add(0, 0).unwrap();
    picker.add(639, 479).unwrap();

    let err = picker.add(640, 10).unwrap_err();
    assert_eq!(
        err,
        DetectError::SlotOutOfBounds {
            x: 640,
            y: 10,
            width: 640,
            height: 480
        }
    );
    assert_eq!(picker.slots().len(), 2);

    assert_eq!(picker.remove_last(), Some(Slot::new(639, 479)));
    picker.clear();
    assert!(picker.slots().is_empty());
    assert!(SlotPicker::new((640, 480), 0, 48).is_err());
}

#[test]
fn picker_reads_canvas_export() {
    let json = r#"{
        "version": "4.4.0",
        "objects": [
            {"type": "rect", "left": 50.7, "top": 95.2, "width": 107, "height": 48},
            {"type": "path", "left": 3, "top": 3},
            {"type": "rect", "left": 158, "top": 95.9}
        ]
    }"#;
    let layout = SlotPicker::from_canvas_json(json, (1100, 720), 107, 48)
        .unwrap()
        .into_layout();

    assert_eq!(layout.slots, vec![Slot::new(50, 95), Slot::new(158, 95)]);
    assert_eq!((layout.image_width, layout.image_height), (1100, 720));

    let negative = r#"{"objects": [{"left": -4, "top": 10}]}"#;
    assert!(SlotPicker::from_canvas_json(negative, (1100, 720), 107, 48).is_err());
}

#[test]
fn preview_outlines_picked_slots() {
    let reference = RgbImage::from_pixel(200, 100, Rgb([10, 10, 10]));
    let mut picker = SlotPicker::new(reference.dimensions(), 50, 30).unwrap();
    picker.add(20, 20).unwrap();

    let preview = picker.preview(&reference);
    assert_eq!(preview.dimensions(), reference.dimensions());
    assert_ne!(preview.get_pixel(20, 40).0, [10, 10, 10]);
    assert_eq!(preview.get_pixel(150, 80).0, [10, 10, 10]);
    assert_eq!(picker.into_layout().preview(&reference), preview);
}
