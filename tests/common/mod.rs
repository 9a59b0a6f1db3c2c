//! Builders for small synthetic firmware images.

#![allow(dead_code)]

use uuid::Uuid;

pub const FFS2: Uuid = uuid::uuid!("8c8ce578-8a3d-4f1c-9935-896185c32dd3");
pub const EFI_CAPSULE: Uuid = uuid::uuid!("3b6686bd-0d76-4030-b70e-b5519e2fc5a0");
pub const CRC32_SECTION: Uuid = uuid::uuid!("fc1bcdb0-7d31-49aa-936a-a4600d9dd083");
pub const LZMA_SECTION: Uuid = uuid::uuid!("ee4e5898-3914-4259-9d6e-dc7bd79403cf");

pub const VOLUME_HEADER_LEN: usize = 0x48;
pub const FILE_HEADER_LEN: usize = 0x18;

pub const FILE_RAW: u8 = 0x01;
pub const FILE_FREEFORM: u8 = 0x02;

pub const SECTION_COMPRESSION: u8 = 0x01;
pub const SECTION_GUID_DEFINED: u8 = 0x02;
pub const SECTION_UI: u8 = 0x15;
pub const SECTION_FV_IMAGE: u8 = 0x17;
pub const SECTION_RAW: u8 = 0x19;

fn sum8(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |a, &b| a.wrapping_add(b))
}

fn sum16(data: &[u8]) -> u16 {
    data.chunks(2)
        .map(|c| u16::from_le_bytes([c[0], *c.get(1).unwrap_or(&0)]))
        .fold(0u16, u16::wrapping_add)
}

fn pad_to(buf: &mut Vec<u8>, align: usize, fill: u8) {
    while buf.len() % align != 0 {
        buf.push(fill);
    }
}

pub fn section(section_type: u8, body: &[u8]) -> Vec<u8> {
    let size = (4 + body.len()) as u32;
    let mut s = size.to_le_bytes()[..3].to_vec();
    s.push(section_type);
    s.extend_from_slice(body);
    s
}

pub fn raw_section(body: &[u8]) -> Vec<u8> {
    section(SECTION_RAW, body)
}

pub fn ui_section(name: &str) -> Vec<u8> {
    let mut body: Vec<u8> = name.encode_utf16().flat_map(u16::to_le_bytes).collect();
    body.extend_from_slice(&[0, 0]);
    section(SECTION_UI, &body)
}

/// COMPRESSION section announcing `inner.len()` decoded bytes.
pub fn compressed(compression_type: u8, inner: &[u8]) -> Vec<u8> {
    compressed_payload(compression_type, inner.len(), inner)
}

pub fn compressed_payload(compression_type: u8, decoded_len: usize, payload: &[u8]) -> Vec<u8> {
    let mut body = (decoded_len as u32).to_le_bytes().to_vec();
    body.push(compression_type);
    body.extend_from_slice(payload);
    section(SECTION_COMPRESSION, &body)
}

pub fn guided(guid: Uuid, attributes: u16, preamble: &[u8], payload: &[u8]) -> Vec<u8> {
    let data_offset = (4 + 20 + preamble.len()) as u16;
    let mut body = guid.to_bytes_le().to_vec();
    body.extend_from_slice(&data_offset.to_le_bytes());
    body.extend_from_slice(&attributes.to_le_bytes());
    body.extend_from_slice(preamble);
    body.extend_from_slice(payload);
    section(SECTION_GUID_DEFINED, &body)
}

/// Concatenate sections with 4-byte alignment padding.
pub fn sections(list: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    for s in list {
        pad_to(&mut out, 4, 0);
        out.extend_from_slice(s);
    }
    out
}

/// FFS file (erase polarity 1) with valid header checksum and no data
/// checksum.
pub fn file(name: u128, file_type: u8, body: &[u8]) -> Vec<u8> {
    let size = (FILE_HEADER_LEN + body.len()) as u32;
    let mut f = vec![0u8; FILE_HEADER_LEN];
    f[..16].copy_from_slice(&Uuid::from_u128(name).to_bytes_le());
    f[0x12] = file_type;
    f[0x14..0x17].copy_from_slice(&size.to_le_bytes()[..3]);
    f[0x10] = 0u8.wrapping_sub(sum8(&f[..0x17]));
    f[0x11] = 0xAA;
    f[0x17] = 0xF8;
    f.extend_from_slice(body);
    f
}

/// FFSv2 volume holding `files` back to back, with `free` erased bytes at
/// the end. The length is rounded up to the 8-byte block size.
pub fn volume_with_free(files: &[Vec<u8>], free: usize) -> Vec<u8> {
    let mut body = Vec::new();
    for f in files {
        pad_to(&mut body, 8, 0xFF);
        body.extend_from_slice(f);
    }
    pad_to(&mut body, 8, 0xFF);
    body.resize(body.len() + free, 0xFF);
    pad_to(&mut body, 8, 0xFF);

    let len = VOLUME_HEADER_LEN + body.len();
    let mut h = vec![0u8; VOLUME_HEADER_LEN];
    h[0x10..0x20].copy_from_slice(&FFS2.to_bytes_le());
    h[0x20..0x28].copy_from_slice(&(len as u64).to_le_bytes());
    h[0x28..0x2C].copy_from_slice(b"_FVH");
    h[0x2C..0x30].copy_from_slice(&0x0004_FEFFu32.to_le_bytes());
    h[0x30..0x32].copy_from_slice(&(VOLUME_HEADER_LEN as u16).to_le_bytes());
    h[0x37] = 2;
    h[0x38..0x3C].copy_from_slice(&((len / 8) as u32).to_le_bytes());
    h[0x3C..0x40].copy_from_slice(&8u32.to_le_bytes());
    let sum = sum16(&h);
    h[0x32..0x34].copy_from_slice(&0u16.wrapping_sub(sum).to_le_bytes());

    h.extend_from_slice(&body);
    h
}

pub fn volume(files: &[Vec<u8>]) -> Vec<u8> {
    volume_with_free(files, 0)
}

pub fn capsule(guid: Uuid, body: &[u8]) -> Vec<u8> {
    let mut c = guid.to_bytes_le().to_vec();
    c.extend_from_slice(&0x1Cu32.to_le_bytes());
    c.extend_from_slice(&0u32.to_le_bytes());
    c.extend_from_slice(&((0x1C + body.len()) as u32).to_le_bytes());
    c.extend_from_slice(body);
    c
}

/// 16 KiB SPI image: descriptor region at 0, BIOS region at 0x2000 holding
/// `bios` (padded with 0xFF to 8 KiB).
pub fn flash_image(bios: &[u8]) -> Vec<u8> {
    let mut buf = vec![0xFF; 0x4000];
    buf[0x10..0x14].copy_from_slice(&0x0FF0_A55Au32.to_le_bytes());
    buf[0x14..0x18].copy_from_slice(&0x0104_0003u32.to_le_bytes());
    let flreg = |base: u32, limit: u32| (base >> 12) | ((limit >> 12) << 16);
    buf[0x40..0x44].copy_from_slice(&flreg(0, 0x1FFF).to_le_bytes());
    buf[0x44..0x48].copy_from_slice(&flreg(0x2000, 0x3FFF).to_le_bytes());
    for i in 2..9 {
        buf[0x40 + 4 * i..0x44 + 4 * i].copy_from_slice(&0x0000_7FFFu32.to_le_bytes());
    }
    buf[0x2000..0x2000 + bios.len()].copy_from_slice(bios);
    buf
}

/// A volume with two files, each holding one raw section.
pub fn two_file_volume() -> Vec<u8> {
    volume(&[
        file(1, FILE_FREEFORM, &raw_section(&[1, 2, 3, 4])),
        file(2, FILE_FREEFORM, &raw_section(&[5, 6, 7, 8])),
    ])
}
