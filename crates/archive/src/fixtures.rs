//! In-memory container builders for tests.
//!
//! Everything here panics on failure: if a fixture can't be built, the test
//! using it should not pass.

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use sevenz_rust::{SeqReader, SevenZArchiveEntry, SevenZWriter, SourceReader};
use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

fn encode(width: u32, height: u32, shade: u8, format: image::ImageFormat) -> Vec<u8> {
    let pixels = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([shade, shade.wrapping_add(x as u8), shade.wrapping_add(y as u8)])
    });
    let mut out = Cursor::new(Vec::new());
    pixels.write_to(&mut out, format).expect("fixture image encodes");
    out.into_inner()
}

/// A small valid PNG. Different `shade`s give different bytes.
pub fn png(width: u32, height: u32, shade: u8) -> Vec<u8> {
    encode(width, height, shade, image::ImageFormat::Png)
}

/// A small valid baseline JPEG.
pub fn jpeg(width: u32, height: u32, shade: u8) -> Vec<u8> {
    encode(width, height, shade, image::ImageFormat::Jpeg)
}

/// A ZIP with every member stored uncompressed, in the given order. Names
/// ending in `/` become directory records.
pub fn zip(members: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, data) in members {
        if name.ends_with('/') {
            writer.add_directory(*name, options).expect("fixture directory");
        } else {
            writer.start_file(*name, options).expect("fixture member");
            writer.write_all(data).expect("fixture member data");
        }
    }
    writer.finish().expect("fixture central directory").into_inner()
}

/// A 7z archive (LZMA2). `solid` packs every member into one folder;
/// otherwise each member gets its own.
pub fn sevenz(members: &[(&str, &[u8])], solid: bool) -> Vec<u8> {
    let mut writer = SevenZWriter::new(Cursor::new(Vec::new())).expect("fixture 7z writer");
    let entry = |name: &str| {
        let mut entry = SevenZArchiveEntry::new();
        entry.name = name.to_string();
        entry
    };
    if solid {
        let entries: Vec<_> = members.iter().map(|(name, _)| entry(name)).collect();
        let readers: Vec<_> = members.iter().map(|(_, data)| SourceReader::new(*data)).collect();
        writer.push_archive_entries(entries, SeqReader::new(readers)).expect("fixture 7z block");
    } else {
        for (name, data) in members {
            writer.push_archive_entry(entry(name), Some(*data)).expect("fixture 7z member");
        }
    }
    writer.finish().expect("fixture 7z header").into_inner()
}

/// A RAR 4 archive with every member stored uncompressed, in order.
/// Duplicate names are kept as separate members.
pub fn rar(members: &[(&str, &[u8])], solid: bool) -> Vec<u8> {
    fn block(out: &mut Vec<u8>, kind: u8, flags: u16, body: &[u8]) {
        let mut header = vec![kind];
        header.extend_from_slice(&flags.to_le_bytes());
        header.extend_from_slice(&((body.len() + 7) as u16).to_le_bytes());
        header.extend_from_slice(body);
        out.extend_from_slice(&(crc32fast::hash(&header) as u16).to_le_bytes());
        out.extend_from_slice(&header);
    }

    let mut out = b"Rar!\x1a\x07\x00".to_vec();
    block(&mut out, 0x73, if solid { 0x0008 } else { 0 }, &[0; 6]);
    for (index, (name, data)) in members.iter().enumerate() {
        let mut body = Vec::new();
        body.extend_from_slice(&(data.len() as u32).to_le_bytes());
        body.extend_from_slice(&(data.len() as u32).to_le_bytes());
        body.push(2);
        body.extend_from_slice(&crc32fast::hash(data).to_le_bytes());
        body.extend_from_slice(&0x5021_0000u32.to_le_bytes());
        body.push(29);
        body.push(0x30);
        body.extend_from_slice(&(name.len() as u16).to_le_bytes());
        body.extend_from_slice(&0x20u32.to_le_bytes());
        body.extend_from_slice(name.as_bytes());
        // Bit 0x8000 says a data area follows; 0x0010 continues a solid stream.
        let flags = if solid && index > 0 { 0x8010 } else { 0x8000 };
        block(&mut out, 0x74, flags, &body);
        out.extend_from_slice(data);
    }
    block(&mut out, 0x7B, 0x4000, &[]);
    out
}

/// A ustar archive with the given regular files, in order.
pub fn tar(members: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, data) in members {
        let mut header = tar::Header::new_ustar();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        builder.append_data(&mut header, name, *data).expect("fixture tar member");
    }
    builder.into_inner().expect("fixture tar trailer")
}

/// A PDF with one page per JPEG, each page painting its JPEG as a single
/// full-page image XObject, and an optional document-information dictionary.
pub fn pdf(pages: &[(u32, u32, Vec<u8>)], info: &BTreeMap<&str, &str>) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids = Vec::with_capacity(pages.len());
    for (width, height, jpeg) in pages {
        let image = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => *width as i64,
                "Height" => *height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            jpeg.clone(),
        );
        let image_id = doc.add_object(image);
        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![(*width as i64).into(), 0.into(), 0.into(), (*height as i64).into(), 0.into(), 0.into()],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().expect("fixture content stream")));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), (*width as i64).into(), (*height as i64).into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
        });
        kids.push(page_id.into());
    }
    let count = kids.len() as i64;
    doc.objects.insert(pages_id, Object::Dictionary(dictionary! { "Type" => "Pages", "Kids" => kids, "Count" => count }));
    let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog_id);
    if !info.is_empty() {
        let mut dict = lopdf::Dictionary::new();
        for (key, value) in info {
            dict.set(*key, Object::string_literal(*value));
        }
        let info_id = doc.add_object(dict);
        doc.trailer.set("Info", info_id);
    }
    let mut out = Vec::new();
    doc.save_to(&mut out).expect("fixture PDF serializes");
    out
}
