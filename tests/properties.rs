mod common;

use fwkit::{AutoParser, FirmwareObject, Validity, iterate};
use proptest::prelude::*;

use common::*;

fn try_parse(buf: &[u8]) -> Option<FirmwareObject> {
    let mut parser = AutoParser::new(buf.to_vec());
    parser.format()?;
    parser.parse().ok()
}

/// Every child lies inside its parent's extent, or inside the parent's
/// decoded payload when it has one.
fn children_contained(node: &FirmwareObject) -> bool {
    node.children.iter().all(|c| {
        let end = c.offset + c.size;
        match node.decoded() {
            Some(d) => end <= d.len(),
            None => c.offset >= node.offset && end <= node.offset + node.size,
        }
    })
}

fn sample_image() -> Vec<u8> {
    let mut body = raw_section(&[0x33; 8]);
    for _ in 0..3 {
        body = compressed(0, &body);
    }
    volume_with_free(
        &[
            file(1, FILE_FREEFORM, &sections(&[ui_section("A"), body])),
            file(2, FILE_RAW, &volume(&[file(3, FILE_FREEFORM, &raw_section(&[1; 4]))])),
        ],
        0x20,
    )
}

proptest! {
    #[test]
    fn arbitrary_input_never_panics(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let _ = try_parse(&data);
    }

    #[test]
    fn corrupted_images_stay_well_formed(
        index in any::<prop::sample::Index>(),
        value in any::<u8>(),
    ) {
        let mut buf = sample_image();
        let i = index.index(buf.len());
        buf[i] = value;

        if let Some(root) = try_parse(&buf) {
            for node in iterate(&root) {
                prop_assert!(children_contained(node));
                if node.validity == Validity::RecursionLimitExceeded {
                    prop_assert!(node.children.is_empty());
                }
            }
            let again = try_parse(&buf).expect("second parse");
            let a: Vec<Validity> = iterate(&root).map(|n| n.validity).collect();
            let b: Vec<Validity> = iterate(&again).map(|n| n.validity).collect();
            prop_assert_eq!(a, b);
        }
    }

    #[test]
    fn truncated_images_never_read_out_of_bounds(len in 0usize..0x200) {
        let buf = sample_image();
        let len = len.min(buf.len());
        if let Some(root) = try_parse(&buf[..len]) {
            prop_assert!(root.size <= len);
            prop_assert!(iterate(&root).all(children_contained));
        }
    }

    #[test]
    fn flatten_is_stable(extra in 0usize..0x40) {
        let buf = volume_with_free(&[file(1, FILE_RAW, &[0u8; 5])], extra);
        let root = try_parse(&buf).expect("valid volume");
        prop_assert_eq!(fwkit::flatten(iterate(&root)).len(), root.count());
        prop_assert_eq!(iterate(&root).count(), iterate(&root).count());
    }
}

#[test]
fn sample_image_is_fully_valid() {
    let root = try_parse(&sample_image()).expect("sample parses");
    assert!(iterate(&root).all(|n| n.is_valid()));
    assert_eq!(root.children[0].name(), Some("A"));
    assert!(iterate(&root).all(children_contained));
}
