//! Well-known GUIDs used to identify file systems, capsules and encoded
//! sections.

use uuid::{Uuid, uuid};

/// FFS v1 file system (`EFI_FIRMWARE_FILE_SYSTEM_GUID`).
pub const FFS1: Uuid = uuid!("7a9354d9-0468-444a-81ce-0bf617d890df");
/// FFS v2 file system (`EFI_FIRMWARE_FILE_SYSTEM2_GUID`).
pub const FFS2: Uuid = uuid!("8c8ce578-8a3d-4f1c-9935-896185c32dd3");
/// FFS v3 file system with large-file support.
pub const FFS3: Uuid = uuid!("5473c07a-3dcb-4dca-bd6f-1e9689e7349a");
/// NVRAM variable store volume.
pub const NVRAM: Uuid = uuid!("fff12b8d-7696-4c8b-a985-2747075b4f50");

pub const EFI_CAPSULE: Uuid = uuid!("3b6686bd-0d76-4030-b70e-b5519e2fc5a0");
pub const INTEL_CAPSULE: Uuid = uuid!("539182b9-abb5-4391-b69a-e3a943f72fcc");
pub const LENOVO_CAPSULE: Uuid = uuid!("e20bafd3-9914-4f4f-9537-3129e090eb3c");
pub const LENOVO2_CAPSULE: Uuid = uuid!("25b5fe76-8243-4a5c-a9bd-7ee3246198b5");
pub const TOSHIBA_CAPSULE: Uuid = uuid!("3be07062-1d51-45d2-832b-f093257ed461");
pub const APTIO_SIGNED_CAPSULE: Uuid = uuid!("4a3ca68b-7723-48fb-803d-578cc1fec44d");
pub const APTIO_UNSIGNED_CAPSULE: Uuid = uuid!("14eebb90-890a-43db-aed1-5d3c4588a418");
pub const FMP_CAPSULE: Uuid = uuid!("6dcbd5ed-e82d-4c44-bda1-7194199ad92a");

pub const LZMA_CUSTOM_DECOMPRESS: Uuid = uuid!("ee4e5898-3914-4259-9d6e-dc7bd79403cf");
pub const LZMAF86_CUSTOM_DECOMPRESS: Uuid = uuid!("d42ae6bd-1352-4bfb-909a-ca72a6eae889");
pub const TIANO_CUSTOM_DECOMPRESS: Uuid = uuid!("a31280ad-481e-41b6-95e8-127f4c984779");
pub const BROTLI_CUSTOM_DECOMPRESS: Uuid = uuid!("3d532050-5cda-4fd0-879e-0f7f630d5afb");
pub const CRC32_GUIDED_SECTION: Uuid = uuid!("fc1bcdb0-7d31-49aa-936a-a4600d9dd083");
pub const FIRMWARE_CONTENTS_SIGNED: Uuid = uuid!("0f9d89e8-9259-4f76-a5af-0c89e34023df");

/// Human-readable name for a well-known GUID.
pub fn name(guid: &Uuid) -> Option<&'static str> {
    let name = match *guid {
        FFS1 => "FFSv1",
        FFS2 => "FFSv2",
        FFS3 => "FFSv3",
        NVRAM => "NVRAM",
        EFI_CAPSULE => "EFI capsule",
        INTEL_CAPSULE => "UEFI capsule",
        LENOVO_CAPSULE | LENOVO2_CAPSULE => "Lenovo capsule",
        TOSHIBA_CAPSULE => "Toshiba capsule",
        APTIO_SIGNED_CAPSULE => "AMI Aptio signed capsule",
        APTIO_UNSIGNED_CAPSULE => "AMI Aptio unsigned capsule",
        FMP_CAPSULE => "FMP capsule",
        LZMA_CUSTOM_DECOMPRESS => "LZMA",
        LZMAF86_CUSTOM_DECOMPRESS => "LZMA (x86 BCJ)",
        TIANO_CUSTOM_DECOMPRESS => "Tiano",
        BROTLI_CUSTOM_DECOMPRESS => "Brotli",
        CRC32_GUIDED_SECTION => "CRC32",
        FIRMWARE_CONTENTS_SIGNED => "Signed contents",
        _ => return None,
    };
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_endian_layout() {
        // FFSv2 as it appears on disk.
        let raw = [
            0x78, 0xE5, 0x8C, 0x8C, 0x3D, 0x8A, 0x1C, 0x4F, 0x99, 0x35, 0x89, 0x61, 0x85, 0xC3,
            0x2D, 0xD3,
        ];
        assert_eq!(Uuid::from_bytes_le(raw), FFS2);
        assert_eq!(FFS2.to_bytes_le(), raw);
    }

    #[test]
    fn names() {
        assert_eq!(name(&FFS3), Some("FFSv3"));
        assert_eq!(name(&LENOVO2_CAPSULE), Some("Lenovo capsule"));
        assert_eq!(name(&Uuid::nil()), None);
    }
}
