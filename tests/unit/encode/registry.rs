use super::*;

fn solid(w: u32, h: u32) -> SourceImage {
    SourceImage::from_rgba8(w, h, vec![255; (w * h * 4) as usize]).unwrap()
}

#[test]
fn same_identity_resolves_to_one_entry() {
    let mut reg = ImageRegistry::new();
    let img = solid(2, 2);
    let copy = img.clone();
    let (a, _) = reg.resolve(&img).unwrap();
    let (b, _) = reg.resolve(&copy).unwrap();
    assert_eq!(a, b);
    assert_eq!(reg.len(), 1);
}

#[test]
fn equal_pixels_are_distinct_images() {
    let mut reg = ImageRegistry::new();
    let (a, _) = reg.resolve(&solid(1, 1)).unwrap();
    let (b, _) = reg.resolve(&solid(1, 1)).unwrap();
    assert!(b > a);
    assert_eq!(reg.len(), 2);
}

#[test]
fn wrong_byte_count_is_rejected() {
    let err = SourceImage::from_rgba8(2, 2, vec![0; 15]).unwrap_err();
    assert!(err.to_string().contains("needs 16 bytes"));
}

#[test]
fn idle_entries_are_evicted_and_ids_not_reused() {
    let mut reg = ImageRegistry::new();
    let old = solid(1, 1);
    let hot = solid(1, 1);
    let (old_id, _) = reg.resolve(&old).unwrap();
    let (hot_id, _) = reg.resolve(&hot).unwrap();

    for _ in 0..4 {
        assert!(reg.touch(hot_id).is_some());
        reg.note_commit();
    }
    assert!(reg.evict_idle(4).is_empty());
    let evicted = reg.evict_idle(3);
    assert_eq!(evicted, vec![old_id]);
    assert!(reg.get(old_id).is_none());
    assert!(reg.get(hot_id).is_some());

    let (again, _) = reg.resolve(&old).unwrap();
    assert!(again > hot_id);
    assert_ne!(again, old_id);
}

#[test]
fn nothing_is_evicted_before_the_threshold() {
    let mut reg = ImageRegistry::new();
    reg.resolve(&solid(1, 1)).unwrap();
    reg.note_commit();
    assert!(reg.evict_idle(2).is_empty());
    assert_eq!(reg.len(), 1);
}
