//! ZIP recovery from local file headers.
//!
//! The central directory sits at the end of a ZIP file, so a truncated
//! download or a zeroed tail loses it while every member's own local header
//! (and data) is intact. Scanning forward for local headers rebuilds a
//! usable index for stored and deflated members.

use crate::error::{ErrorKind, Result};
use crate::models::Entry;
use exn::ResultExt;
use flate2::read::DeflateDecoder;
use memchr::memmem;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

const LOCAL_HEADER_SIG: &[u8] = b"PK\x03\x04";
const DATA_DESCRIPTOR_SIG: &[u8] = b"PK\x07\x08";
const LOCAL_HEADER_LEN: usize = 30;
const FLAG_ENCRYPTED: u16 = 0x0001;
const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;
const METHOD_STORED: u16 = 0;
const METHOD_DEFLATED: u16 = 8;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct LocalMember {
    pub(crate) name: String,
    pub(crate) method: u16,
    pub(crate) crc32: u32,
    pub(crate) compressed_size: u64,
    pub(crate) size: u64,
    pub(crate) data_offset: u64,
    pub(crate) damage: Option<String>,
}

fn u16_at(data: &[u8], at: usize) -> Option<u16> {
    Some(u16::from_le_bytes(data.get(at..at + 2)?.try_into().ok()?))
}

fn u32_at(data: &[u8], at: usize) -> Option<u32> {
    Some(u32::from_le_bytes(data.get(at..at + 4)?.try_into().ok()?))
}

/// Find every member with a parseable local header, in file order.
pub(crate) fn scan(data: &[u8]) -> Vec<LocalMember> {
    let mut members = Vec::new();
    let mut resume = 0usize;
    for at in memmem::find_iter(data, LOCAL_HEADER_SIG) {
        // Signatures inside the previous member's data are just data.
        if at < resume {
            continue;
        }
        let Some(member) = parse_local_header(data, at) else {
            continue;
        };
        resume = (member.data_offset + member.compressed_size) as usize;
        members.push(member);
    }
    members
}

fn parse_local_header(data: &[u8], at: usize) -> Option<LocalMember> {
    let flags = u16_at(data, at + 6)?;
    let method = u16_at(data, at + 8)?;
    let mut crc32 = u32_at(data, at + 14)?;
    let mut compressed_size = u64::from(u32_at(data, at + 18)?);
    let mut size = u64::from(u32_at(data, at + 22)?);
    let name_len = usize::from(u16_at(data, at + 26)?);
    let extra_len = usize::from(u16_at(data, at + 28)?);
    let name_start = at + LOCAL_HEADER_LEN;
    let name = String::from_utf8_lossy(data.get(name_start..name_start + name_len)?).into_owned();
    let data_offset = name_start + name_len + extra_len;
    let mut damage = None;
    if flags & FLAG_DATA_DESCRIPTOR != 0 {
        // Sizes live after the data; the descriptor signature is optional in
        // the format but written by every tool that matters.
        match memmem::find(data.get(data_offset..)?, DATA_DESCRIPTOR_SIG) {
            Some(found) => {
                let descriptor = data_offset + found;
                crc32 = u32_at(data, descriptor + 4).unwrap_or(crc32);
                compressed_size = found as u64;
                size = u32_at(data, descriptor + 12).map_or(size, u64::from);
            },
            None => damage = Some("data descriptor missing".to_string()),
        }
    }
    if flags & FLAG_ENCRYPTED != 0 {
        damage = Some("encrypted".to_string());
    } else if !matches!(method, METHOD_STORED | METHOD_DEFLATED) {
        damage = Some(format!("unsupported compression method {method}"));
    }
    if data_offset as u64 + compressed_size > data.len() as u64 {
        damage = Some("member data extends past end of file".to_string());
        compressed_size = (data.len() - data_offset.min(data.len())) as u64;
    }
    Some(LocalMember {
        name,
        method,
        crc32,
        compressed_size,
        size,
        data_offset: data_offset as u64,
        damage,
    })
}

impl LocalMember {
    pub(crate) fn entry(&self) -> Entry {
        let entry = if self.name.ends_with('/') {
            Entry::directory(self.name.clone())
        } else {
            Entry::member(self.name.clone(), self.size)
        };
        match &self.damage {
            Some(reason) => entry.with_damage(reason.clone()),
            None => entry,
        }
    }

    /// Read and decompress this member, verifying its CRC-32.
    pub(crate) fn read(&self, file: &mut File) -> Result<Vec<u8>> {
        if let Some(reason) = &self.damage {
            exn::bail!(ErrorKind::EntryRead(format!("{}: {reason}", self.name)));
        }
        file.seek(SeekFrom::Start(self.data_offset)).map_err(ErrorKind::Io)?;
        let mut raw = Vec::with_capacity(super::reserve_for(self.compressed_size));
        file.by_ref().take(self.compressed_size).read_to_end(&mut raw).map_err(ErrorKind::Io)?;
        let data = match self.method {
            METHOD_STORED => raw,
            METHOD_DEFLATED => {
                let mut out = Vec::with_capacity(super::reserve_for(self.size));
                DeflateDecoder::new(raw.as_slice())
                    .read_to_end(&mut out)
                    .or_raise(|| ErrorKind::EntryRead(self.name.clone()))?;
                out
            },
            other => exn::bail!(ErrorKind::Unsupported(format!("{}: compression method {other}", self.name))),
        };
        if crc32fast::hash(&data) != self.crc32 {
            exn::bail!(ErrorKind::EntryRead(format!("{}: CRC-32 mismatch", self.name)));
        }
        Ok(data)
    }
}
