//! Integration tests that decode synthetic packs (built in-memory, including an ref-delta
//! chain) and rebuild their `.idx` files, asserting the rebuilt offsets match the ones the
//! decoder observed while streaming the pack, for both SHA-1 and SHA-256 object formats.

use std::{
    convert::TryInto,
    io::{Cursor, Write},
};

use flate2::{Compression, write::ZlibEncoder};
use tokio::sync::mpsc;
use wit_internal::{
    errors::GitError,
    hash::{HashKind, ObjectHash, set_hash_kind_for_test},
    internal::pack::{Pack, entry::Entry, pack_index::IdxBuilder, pack_index::IndexEntry},
};

fn zlib(data: &[u8]) -> Vec<u8> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

fn entry_header(obj_type: u8, mut size: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let mut first = (obj_type << 4) | (size as u8 & 0x0f);
    size >>= 4;
    if size > 0 {
        first |= 0x80;
    }
    out.push(first);
    while size > 0 {
        let mut byte = (size & 0x7f) as u8;
        size >>= 7;
        if size > 0 {
            byte |= 0x80;
        }
        out.push(byte);
    }
    out
}

/// Build a pack with three plain blobs (no deltas).
fn build_small_pack() -> Vec<u8> {
    let bodies: [&[u8]; 3] = [b"alpha content", b"beta content, a bit longer", b"gamma"];

    let mut buf = Vec::new();
    buf.extend_from_slice(b"PACK");
    buf.extend_from_slice(&2u32.to_be_bytes());
    buf.extend_from_slice(&(bodies.len() as u32).to_be_bytes());
    for body in bodies {
        buf.extend(entry_header(3, body.len())); // 3 == blob
        buf.extend(zlib(body));
    }
    let hash = ObjectHash::new(&buf);
    buf.extend(hash.as_ref());
    buf
}

/// Encode a usize as a Git-style varint (7 bits per byte, msb = continue).
fn write_size_encoding(mut number: usize) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        if number >> 7 > 0 {
            out.push((number & 0x7f) as u8 | 0x80);
        } else {
            out.push((number & 0x7f) as u8);
            break;
        }
        number >>= 7;
    }
    out
}

/// Build a minimal literal-only delta stream (no copy instructions) that replaces `base`
/// wholesale with `target`; valid per the delta decoder regardless of how it was produced.
fn build_insert_only_delta(base: &[u8], target: &[u8]) -> Vec<u8> {
    let mut out = write_size_encoding(base.len());
    out.extend(write_size_encoding(target.len()));
    for chunk in target.chunks(0x7f) {
        out.push(chunk.len() as u8);
        out.extend_from_slice(chunk);
    }
    out
}

/// Build a pack with one base blob and a ref-delta entry pointing at it by hash.
fn build_delta_pack() -> Vec<u8> {
    let base = b"the quick brown fox jumps over the lazy dog";
    let target = b"the quick brown fox jumps over the very lazy dog indeed";
    let base_hash = ObjectHash::from_type_and_data(
        wit_internal::internal::object::types::ObjectType::Blob,
        base,
    );

    let delta_bytes = build_insert_only_delta(base, target);

    let mut buf = Vec::new();
    buf.extend_from_slice(b"PACK");
    buf.extend_from_slice(&2u32.to_be_bytes());
    buf.extend_from_slice(&2u32.to_be_bytes());

    buf.extend(entry_header(3, base.len()));
    buf.extend(zlib(base));

    buf.extend(entry_header(7, delta_bytes.len())); // 7 == ref-delta
    buf.extend(base_hash.as_ref());
    buf.extend(zlib(&delta_bytes));

    let hash = ObjectHash::new(&buf);
    buf.extend(hash.as_ref());
    buf
}

fn parse_idx_offsets(idx_bytes: &[u8], kind: HashKind) -> std::collections::HashMap<Vec<u8>, u64> {
    assert!(idx_bytes.len() >= 8, "idx too short");
    assert_eq!(&idx_bytes[0..4], &[0xFF, 0x74, 0x4F, 0x63], "idx magic");
    let version = u32::from_be_bytes(idx_bytes[4..8].try_into().unwrap());
    assert_eq!(version, 2, "idx version must be 2 per pack-format spec");

    let mut cursor = 8usize;
    let mut fanout = [0u32; 256];
    for (i, slot) in fanout.iter_mut().enumerate() {
        *slot = u32::from_be_bytes(idx_bytes[cursor + i * 4..cursor + i * 4 + 4].try_into().unwrap());
    }
    cursor += 256 * 4;

    let object_count = fanout[255] as usize;
    let hash_len = kind.size();
    let names_end = cursor + object_count * hash_len;
    let names = &idx_bytes[cursor..names_end];
    cursor = names_end;

    cursor += object_count * 4; // skip CRCs

    let offsets_end = cursor + object_count * 4;
    let offsets_bytes = &idx_bytes[cursor..offsets_end];
    cursor = offsets_end;

    let large_count = offsets_bytes
        .chunks_exact(4)
        .filter(|raw| u32::from_be_bytes((*raw).try_into().unwrap()) & 0x8000_0000 != 0)
        .count();

    let mut large_offsets = Vec::with_capacity(large_count);
    for _ in 0..large_count {
        let v = u64::from_be_bytes(idx_bytes[cursor..cursor + 8].try_into().unwrap());
        large_offsets.push(v);
        cursor += 8;
    }

    let mut map = std::collections::HashMap::new();
    for (i, raw) in offsets_bytes.chunks_exact(4).enumerate() {
        let raw = u32::from_be_bytes(raw.try_into().unwrap());
        let offset = if raw & 0x8000_0000 == 0 {
            raw as u64
        } else {
            let idx = (raw & 0x7FFF_FFFF) as usize;
            large_offsets[idx]
        };
        let hash = names[i * hash_len..(i + 1) * hash_len].to_vec();
        map.insert(hash, offset);
    }
    map
}

async fn roundtrip(pack_bytes: Vec<u8>, kind: HashKind) -> Result<(), GitError> {
    let _guard = set_hash_kind_for_test(kind);

    let mut pack = Pack::new(None, None, None, true);
    let mut decoded: Vec<(Entry, usize)> = Vec::new();
    pack.decode(&mut Cursor::new(pack_bytes), |entry, offset| {
        decoded.push((entry, offset));
    })?;
    assert_eq!(decoded.len(), pack.number, "decoded entries count mismatch");

    let idx_entries: Vec<IndexEntry> = decoded
        .iter()
        .map(|(entry, offset)| IndexEntry::new(entry, *offset))
        .collect();

    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(1024);
    let mut builder = IdxBuilder::new(idx_entries.len(), tx, pack.signature);
    builder.write_idx(idx_entries).await?;

    let mut idx_bytes = Vec::new();
    while let Some(chunk) = rx.recv().await {
        idx_bytes.extend_from_slice(&chunk);
    }

    let offsets_map = parse_idx_offsets(&idx_bytes, kind);
    for (entry, offset) in &decoded {
        let hash_bytes = entry.hash.to_data();
        let actual = *offsets_map
            .get(&hash_bytes)
            .unwrap_or_else(|| panic!("hash missing in idx: {}", entry.hash));
        assert_eq!(actual, *offset as u64, "offset mismatch for {}", entry.hash);
    }
    Ok(())
}

#[tokio::test]
async fn idx_offsets_match_sha1_small() -> Result<(), GitError> {
    roundtrip(build_small_pack(), HashKind::Sha1).await
}

#[tokio::test]
async fn idx_offsets_match_sha1_delta() -> Result<(), GitError> {
    roundtrip(build_delta_pack(), HashKind::Sha1).await
}

#[tokio::test]
async fn idx_offsets_match_sha256_small() -> Result<(), GitError> {
    roundtrip(build_small_pack(), HashKind::Sha256).await
}

#[tokio::test]
async fn idx_offsets_match_sha256_delta() -> Result<(), GitError> {
    roundtrip(build_delta_pack(), HashKind::Sha256).await
}
