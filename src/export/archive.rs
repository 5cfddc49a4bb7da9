//! Portable export archive.
//!
//! Single-file container layout:
//!
//! ```text
//! magic  "INKA"
//! u8     container version (1)
//! u32le  entry count
//! entry* u16le name len | name (utf-8) | u64le payload len | payload
//! ```
//!
//! The first entry is always `manifest.json` (format version, creation
//! timestamp, app version, checksum). The SHA-256 checksum covers every
//! other entry (name bytes then payload, in order) and is recomputed and
//! compared on import; a mismatch fails the import with no partial write.
//!
//! Remaining entries: `instance.json` (instance metadata), `template.json`
//! (template metadata), `template.doc` (raw document bytes), and one
//! `pages/<index>.ink` packed stroke blob per annotated page.

use crate::foundation::core::PageIndex;
use crate::foundation::error::{InklayError, InklayResult};
use crate::foundation::ids::InstanceId;
use crate::model::entities::Instance;
use crate::model::store::DocumentStore;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

const MAGIC: &[u8; 4] = b"INKA";
const CONTAINER_VERSION: u8 = 1;
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct Manifest {
    format_version: u32,
    created_at: DateTime<Utc>,
    app_version: String,
    checksum: String,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct TemplateMeta {
    name: String,
    page_count: u32,
    created_at: DateTime<Utc>,
}

/// Write a portable archive for one instance.
pub fn write_archive(store: &dyn DocumentStore, instance: InstanceId) -> InklayResult<Vec<u8>> {
    let inst = store
        .instance(instance)?
        .ok_or_else(|| InklayError::validation(format!("unknown instance {instance}")))?;
    let template = store.template(inst.template_id)?.ok_or_else(|| {
        InklayError::storage(format!("instance {instance} references a missing template"))
    })?;

    let mut entries: Vec<(String, Vec<u8>)> = Vec::new();
    entries.push((
        "instance.json".to_owned(),
        serde_json::to_vec_pretty(&inst)
            .map_err(|e| InklayError::storage(format!("serialize instance: {e}")))?,
    ));
    entries.push((
        "template.json".to_owned(),
        serde_json::to_vec_pretty(&TemplateMeta {
            name: template.name.clone(),
            page_count: template.page_count,
            created_at: template.created_at,
        })
        .map_err(|e| InklayError::storage(format!("serialize template: {e}")))?,
    ));
    entries.push(("template.doc".to_owned(), template.bytes.to_vec()));
    for page in store.annotated_pages(instance)? {
        if let Some(ann) = store.page_annotation(instance, page)?
            && !ann.is_blank()
        {
            entries.push((format!("pages/{page}.ink"), ann.payload.to_vec()));
        }
    }

    let manifest = Manifest {
        format_version: FORMAT_VERSION,
        created_at: Utc::now(),
        app_version: env!("CARGO_PKG_VERSION").to_owned(),
        checksum: checksum_hex(&entries),
    };
    let manifest_bytes = serde_json::to_vec_pretty(&manifest)
        .map_err(|e| InklayError::storage(format!("serialize manifest: {e}")))?;

    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.push(CONTAINER_VERSION);
    let count: u32 = (entries.len() + 1)
        .try_into()
        .map_err(|_| InklayError::validation("too many archive entries"))?;
    out.extend_from_slice(&count.to_le_bytes());
    write_entry(&mut out, "manifest.json", &manifest_bytes)?;
    for (name, payload) in &entries {
        write_entry(&mut out, name, payload)?;
    }
    Ok(out)
}

/// Import a portable archive, creating a fresh template and instance.
///
/// The checksum is verified and every entry validated before anything is
/// written; a store failure mid-import rolls the new template back so no
/// partial records survive.
pub fn import_archive(store: &dyn DocumentStore, bytes: &[u8]) -> InklayResult<Instance> {
    let entries = read_container(bytes)?;
    let (manifest_name, manifest_bytes) = entries
        .first()
        .ok_or_else(|| InklayError::decode("archive has no entries"))?;
    if manifest_name.as_str() != "manifest.json" {
        return Err(InklayError::decode("archive must lead with manifest.json"));
    }
    let manifest: Manifest = serde_json::from_slice(manifest_bytes)
        .map_err(|e| InklayError::decode(format!("malformed manifest: {e}")))?;
    if manifest.format_version != FORMAT_VERSION {
        return Err(InklayError::decode(format!(
            "unsupported archive format version {}",
            manifest.format_version
        )));
    }

    let body = &entries[1..];
    let actual = checksum_hex(body);
    if actual != manifest.checksum {
        return Err(InklayError::decode(
            "archive checksum mismatch, refusing to import",
        ));
    }

    let source_instance: Instance = serde_json::from_slice(find_entry(body, "instance.json")?)
        .map_err(|e| InklayError::decode(format!("malformed instance metadata: {e}")))?;
    let template_meta: TemplateMeta = serde_json::from_slice(find_entry(body, "template.json")?)
        .map_err(|e| InklayError::decode(format!("malformed template metadata: {e}")))?;
    let doc_bytes = find_entry(body, "template.doc")?;

    let mut pages: Vec<(PageIndex, &[u8])> = Vec::new();
    for (name, payload) in body {
        if let Some(rest) = name.strip_prefix("pages/") {
            let index: u32 = rest
                .strip_suffix(".ink")
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| {
                    InklayError::decode(format!("malformed page entry name '{name}'"))
                })?;
            if index >= template_meta.page_count {
                return Err(InklayError::decode(format!(
                    "page entry {index} out of range for a {}-page template",
                    template_meta.page_count
                )));
            }
            pages.push((PageIndex(index), payload));
        }
    }

    let template = store.create_template(
        &template_meta.name,
        doc_bytes.to_vec(),
        template_meta.page_count,
    )?;
    let result = (|| -> InklayResult<Instance> {
        let instance = store.create_instance(template.id, &source_instance.name)?;
        if source_instance.favorite {
            store.set_favorite(instance.id, true)?;
        }
        if !source_instance.notes.is_empty() {
            store.set_notes(instance.id, &source_instance.notes)?;
        }
        if source_instance
            .last_viewed_page
            .in_range(template_meta.page_count)
        {
            store.set_last_viewed_page(instance.id, source_instance.last_viewed_page)?;
        }
        for (page, payload) in &pages {
            store.write_annotation(instance.id, *page, payload.to_vec())?;
        }
        store
            .instance(instance.id)?
            .ok_or_else(|| InklayError::storage("imported instance vanished"))
    })();

    match result {
        Ok(instance) => Ok(instance),
        Err(e) => {
            // Cascade removes any partially imported records.
            if let Err(cleanup) = store.delete_template(template.id) {
                tracing::warn!(error = %cleanup, "failed to roll back partial import");
            }
            Err(e)
        }
    }
}

fn write_entry(out: &mut Vec<u8>, name: &str, payload: &[u8]) -> InklayResult<()> {
    let name_len: u16 = name
        .len()
        .try_into()
        .map_err(|_| InklayError::validation(format!("entry name '{name}' too long")))?;
    out.extend_from_slice(&name_len.to_le_bytes());
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(payload);
    Ok(())
}

fn read_container(bytes: &[u8]) -> InklayResult<Vec<(String, Vec<u8>)>> {
    let mut r = Reader { buf: bytes, pos: 0 };
    if r.take(4)? != MAGIC {
        return Err(InklayError::decode("not an inklay archive"));
    }
    let version = r.take(1)?[0];
    if version != CONTAINER_VERSION {
        return Err(InklayError::decode(format!(
            "unsupported container version {version}"
        )));
    }
    let count = r.u32()?;
    let mut entries = Vec::new();
    for _ in 0..count {
        let name_len = r.u16()? as usize;
        let name = std::str::from_utf8(r.take(name_len)?)
            .map_err(|_| InklayError::decode("entry name is not utf-8"))?
            .to_owned();
        let payload_len: usize = r
            .u64()?
            .try_into()
            .map_err(|_| InklayError::decode("entry payload too large"))?;
        entries.push((name, r.take(payload_len)?.to_vec()));
    }
    if r.pos != bytes.len() {
        return Err(InklayError::decode("trailing bytes after last entry"));
    }
    Ok(entries)
}

fn find_entry<'a>(entries: &'a [(String, Vec<u8>)], name: &str) -> InklayResult<&'a [u8]> {
    entries
        .iter()
        .find(|(n, _)| n.as_str() == name)
        .map(|(_, payload)| payload.as_slice())
        .ok_or_else(|| InklayError::decode(format!("archive is missing '{name}'")))
}

fn checksum_hex(entries: &[(String, Vec<u8>)]) -> String {
    let mut hasher = Sha256::new();
    for (name, payload) in entries {
        hasher.update(name.as_bytes());
        hasher.update(payload);
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> InklayResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| InklayError::decode("archive truncated"))?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u16(&mut self) -> InklayResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> InklayResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> InklayResult<u64> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/export/archive.rs"]
mod tests;
