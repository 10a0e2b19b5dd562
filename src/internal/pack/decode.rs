//! Pack stream decoder: header parsing, variable-length object headers, zlib inflation, and
//! ofs-delta/ref-delta reconstruction via a waitlist so the whole pack can be read in one pass.

use std::collections::HashMap;
use std::io::{BufReader, Cursor, Read};
use std::path::PathBuf;

use crate::{
    delta::decode::delta_decode,
    errors::GitError,
    hash::ObjectHash,
    internal::{
        object::types::ObjectType,
        pack::{
            cache_object::{CacheObject, CacheObjectInfo},
            entry::Entry,
            waitlist::Waitlist,
            wrapper::Wrapper,
        },
        zlib::stream::inflate::ReadBoxed,
    },
};

/// A decoded (or about-to-be-encoded) representation of a Git pack file.
///
/// `mem_limit`, `cache_path`, and `thread_num` mirror the knobs a host application would
/// configure through [`crate::config::PackConfig`]; the in-memory decoder below accepts them
/// for API compatibility with larger deployments but always keeps reconstructed objects
/// resident rather than spilling to `cache_path`.
pub struct Pack {
    pub number: usize,
    pub signature: ObjectHash,
    pub objects: Vec<Entry>,
    mem_limit: Option<usize>,
    cache_path: Option<PathBuf>,
    thread_num: Option<usize>,
    clean_tmp: bool,
}

impl Pack {
    pub fn new(
        mem_limit: Option<usize>,
        cache_path: Option<PathBuf>,
        thread_num: Option<usize>,
        clean_tmp: bool,
    ) -> Self {
        Pack {
            number: 0,
            signature: ObjectHash::default(),
            objects: Vec::new(),
            mem_limit,
            cache_path,
            thread_num,
            clean_tmp,
        }
    }

    pub fn mem_limit(&self) -> Option<usize> {
        self.mem_limit
    }

    pub fn cache_path(&self) -> Option<&PathBuf> {
        self.cache_path.as_ref()
    }

    pub fn thread_num(&self) -> Option<usize> {
        self.thread_num
    }

    pub fn clean_tmp(&self) -> bool {
        self.clean_tmp
    }

    /// Decode a full pack stream, invoking `callback` once per reconstructed object (base or
    /// delta, in resolution order) with its byte offset in the pack.
    pub fn decode<R: Read>(
        &mut self,
        pack: &mut R,
        mut callback: impl FnMut(Entry, usize),
    ) -> Result<(), GitError> {
        let buffered = BufReader::new(pack);
        let mut wrapper = Wrapper::new(buffered);

        let magic = crate::utils::read_bytes(&mut wrapper, 4)?;
        if magic.as_slice() != b"PACK" {
            return Err(GitError::InvalidPackHeader(format!(
                "bad signature {magic:?}"
            )));
        }
        let version = read_be_u32(&mut wrapper)?;
        if version != 2 && version != 3 {
            return Err(GitError::InvalidPackHeader(format!(
                "unsupported pack version {version}"
            )));
        }
        let count = read_be_u32(&mut wrapper)? as usize;
        self.number = count;

        let waitlist = Waitlist::new();
        // offset -> (type, data, chain_len) of every object fully reconstructed so far.
        let mut resolved_by_offset: HashMap<usize, (ObjectType, Vec<u8>, usize)> = HashMap::new();
        // hash -> offset, to find a ref-delta's base among already-resolved objects.
        let mut resolved_by_hash: HashMap<ObjectHash, usize> = HashMap::new();
        let mut objects = Vec::with_capacity(count);

        for _ in 0..count {
            let entry_offset = wrapper.bytes_read();
            let (type_code, size) = read_entry_header(&mut wrapper)?;

            match type_code {
                1..=4 => {
                    let obj_type = ObjectType::from_pack_type_u8(type_code)?;
                    let mut reader = ReadBoxed::new(&mut wrapper, obj_type, size);
                    let mut data = Vec::with_capacity(size);
                    reader.read_to_end(&mut data)?;
                    let digest = reader.hash.clone().finalize();
                    let hash = ObjectHash::from_bytes(&digest).map_err(GitError::InvalidHashValue)?;
                    resolve_and_emit(
                        entry_offset,
                        obj_type,
                        hash,
                        data,
                        0,
                        &mut resolved_by_offset,
                        &mut resolved_by_hash,
                        &waitlist,
                        &mut objects,
                        &mut callback,
                    )?;
                }
                6 => {
                    let rel_offset = read_ofs_delta_offset(&mut wrapper)?;
                    let base_offset = entry_offset.checked_sub(rel_offset).ok_or_else(|| {
                        GitError::InvalidPackFile(
                            "ofs-delta base offset underflows pack start".to_string(),
                        )
                    })?;
                    let mut reader = ReadBoxed::new_for_delta(&mut wrapper);
                    let mut delta_data = Vec::with_capacity(size);
                    reader.read_to_end(&mut delta_data)?;

                    if let Some((base_type, base_data, base_chain)) =
                        resolved_by_offset.get(&base_offset).cloned()
                    {
                        let resolved = apply_delta(&delta_data, &base_data)?;
                        let resolved_hash = ObjectHash::from_type_and_data(base_type, &resolved);
                        resolve_and_emit(
                            entry_offset,
                            base_type,
                            resolved_hash,
                            resolved,
                            base_chain + 1,
                            &mut resolved_by_offset,
                            &mut resolved_by_hash,
                            &waitlist,
                            &mut objects,
                            &mut callback,
                        )?;
                    } else {
                        waitlist.insert_offset(
                            base_offset,
                            CacheObject {
                                info: CacheObjectInfo::OffsetDelta(base_offset),
                                offset: entry_offset,
                                crc32: 0,
                                data_decompressed: delta_data,
                                mem_recorder: None,
                                is_delta_in_pack: true,
                            },
                        );
                    }
                }
                7 => {
                    let base_hash = ObjectHash::from_stream(&mut wrapper)?;
                    let mut reader = ReadBoxed::new_for_delta(&mut wrapper);
                    let mut delta_data = Vec::with_capacity(size);
                    reader.read_to_end(&mut delta_data)?;

                    let base = resolved_by_hash
                        .get(&base_hash)
                        .and_then(|off| resolved_by_offset.get(off))
                        .cloned();
                    if let Some((base_type, base_data, base_chain)) = base {
                        let resolved = apply_delta(&delta_data, &base_data)?;
                        let resolved_hash = ObjectHash::from_type_and_data(base_type, &resolved);
                        resolve_and_emit(
                            entry_offset,
                            base_type,
                            resolved_hash,
                            resolved,
                            base_chain + 1,
                            &mut resolved_by_offset,
                            &mut resolved_by_hash,
                            &waitlist,
                            &mut objects,
                            &mut callback,
                        )?;
                    } else {
                        waitlist.insert_ref(
                            base_hash,
                            CacheObject {
                                info: CacheObjectInfo::HashDelta(base_hash),
                                offset: entry_offset,
                                crc32: 0,
                                data_decompressed: delta_data,
                                mem_recorder: None,
                                is_delta_in_pack: true,
                            },
                        );
                    }
                }
                other => {
                    return Err(GitError::InvalidObjectType(format!(
                        "unsupported pack entry type code {other}"
                    )));
                }
            }
        }

        let computed = wrapper.final_hash();
        let trailer = ObjectHash::from_stream(&mut wrapper)?;
        if computed != trailer {
            return Err(GitError::TrailerMismatch);
        }
        self.signature = trailer;
        self.objects = objects;
        Ok(())
    }
}

fn apply_delta(delta_data: &[u8], base_data: &[u8]) -> Result<Vec<u8>, GitError> {
    let mut cursor = Cursor::new(delta_data.to_vec());
    delta_decode(&mut cursor, base_data).map_err(|e| GitError::DeltaObjectError(e.to_string()))
}

/// Record a freshly reconstructed object, hand it to the caller, and resolve any deltas that
/// were waiting on it (recursively, since resolving one delta can itself unblock others).
#[allow(clippy::too_many_arguments)]
fn resolve_and_emit(
    offset: usize,
    obj_type: ObjectType,
    hash: ObjectHash,
    data: Vec<u8>,
    chain_len: usize,
    resolved_by_offset: &mut HashMap<usize, (ObjectType, Vec<u8>, usize)>,
    resolved_by_hash: &mut HashMap<ObjectHash, usize>,
    waitlist: &Waitlist,
    objects: &mut Vec<Entry>,
    callback: &mut impl FnMut(Entry, usize),
) -> Result<(), GitError> {
    let entry = Entry {
        obj_type,
        data: data.clone(),
        hash,
        chain_len,
    };
    objects.push(entry.clone());
    callback(entry, offset);
    resolved_by_offset.insert(offset, (obj_type, data.clone(), chain_len));
    resolved_by_hash.insert(hash, offset);

    for waiting in waitlist.take(offset, hash) {
        let resolved = apply_delta(&waiting.data_decompressed, &data)?;
        let resolved_hash = ObjectHash::from_type_and_data(obj_type, &resolved);
        resolve_and_emit(
            waiting.offset,
            obj_type,
            resolved_hash,
            resolved,
            chain_len + 1,
            resolved_by_offset,
            resolved_by_hash,
            waitlist,
            objects,
            callback,
        )?;
    }
    Ok(())
}

fn read_be_u32<R: Read>(r: &mut R) -> Result<u32, GitError> {
    let buf = crate::utils::read_bytes(r, 4)?;
    Ok(u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]))
}

fn read_u8<R: Read>(r: &mut R) -> Result<u8, GitError> {
    Ok(crate::utils::read_bytes(r, 1)?[0])
}

/// Read a pack entry header: 3-bit type in the high bits of the first byte, then a
/// continuation-encoded size (4 bits from the first byte, 7 bits from each following byte).
fn read_entry_header<R: Read>(r: &mut R) -> Result<(u8, usize), GitError> {
    let first = read_u8(r)?;
    let type_code = (first >> 4) & 0x07;
    let mut size = (first & 0x0f) as usize;
    let mut shift = 4u32;
    let mut byte = first;
    while byte & 0x80 != 0 {
        byte = read_u8(r)?;
        size |= ((byte & 0x7f) as usize) << shift;
        shift += 7;
    }
    Ok((type_code, size))
}

/// Read an ofs-delta back-reference: the offset is encoded with a different continuation scheme
/// than object sizes (each continuation byte adds 1 before shifting in the next 7 bits).
fn read_ofs_delta_offset<R: Read>(r: &mut R) -> Result<usize, GitError> {
    let mut byte = read_u8(r)?;
    let mut offset = (byte & 0x7f) as usize;
    while byte & 0x80 != 0 {
        byte = read_u8(r)?;
        offset += 1;
        offset = (offset << 7) | (byte & 0x7f) as usize;
    }
    Ok(offset)
}
