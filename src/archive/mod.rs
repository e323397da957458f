//! Archive assembly.
//!
//! Orchestrates the full export: entity classification, name derivation,
//! combined-document composition and sink writes. One unit is produced per
//! (email, attachment) pair, plus one unit per attachment-less email.
//!
//! Failure policy: a failed attachment fetch or combined-document
//! composition skips that unit and is logged; sink write errors are fatal
//! because the archive itself is broken at that point.

pub mod sink;

use chrono::NaiveDate;

use crate::compose::record::{build_record, record_bytes};
use crate::compose::splice::{LopdfSplicer, PdfSplicer};
use crate::compose::{compose_combined_pdf, PreviewOutcome};
use crate::config::NamingLimits;
use crate::entity::{self, Entity, Pattern};
use crate::error::{BundleError, Result};
use crate::fetch::AttachmentFetcher;
use crate::model::{ResolvedAttachment, SelectedItem};
use crate::naming::{
    clean_attachment_name, date_prefix, sanitize_segment, split_extension, NameAllocator,
    ENTITY_FALLBACK, SUBJECT_FALLBACK,
};

use self::sink::ArchiveSink;

/// Counters reported after a build.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArchiveSummary {
    /// Units written (each contributes 2 or 3 files).
    pub units: usize,
    pub files_written: usize,
    /// Attachments whose fetch failed; their units were skipped.
    pub attachments_skipped: usize,
    /// Combined documents that went out without their preview page.
    pub previews_skipped: usize,
    /// Units dropped because no combined document could be produced at all.
    pub units_skipped: usize,
}

/// Build an archive from the selected items.
///
/// Items are processed in the caller's order, attachments in message order,
/// and every unit writes raw file, combined PDF, combined JSON in that
/// order — output is fully deterministic for a given input.
///
/// `progress` is called with `(processed items, total items)`.
pub async fn build_archive(
    items: &[SelectedItem],
    entities: &[Entity],
    fetcher: &dyn AttachmentFetcher,
    sink: &mut dyn ArchiveSink,
    limits: &NamingLimits,
    progress: Option<&dyn Fn(usize, usize)>,
) -> Result<ArchiveSummary> {
    validate(items)?;

    let table = entity::pattern_table(entities);
    let mut alloc = NameAllocator::new();
    let splicer = LopdfSplicer;
    let mut summary = ArchiveSummary::default();
    let total = items.len();

    for (index, item) in items.iter().enumerate() {
        if let Some(report) = progress {
            report(index, total);
        }

        let entity_name = resolve_entity_name(item, &table);
        let folder = sanitize_segment(&entity_name, limits.max_entity_len, ENTITY_FALLBACK);
        let date = date_prefix(&item.date);
        let subject_slug = sanitize_segment(&item.subject, limits.max_subject_len, SUBJECT_FALLBACK);

        if item.attachments.is_empty() {
            let stem = alloc.allocate(&folder, &format!("{date}_{subject_slug}"));
            write_unit(
                sink,
                &folder,
                &stem,
                item,
                &entity_name,
                None,
                None,
                &splicer,
                &mut summary,
            )?;
            continue;
        }

        for att in &item.attachments {
            let bytes = match fetcher.fetch(&item.account_ref, &item.message_id, &att.id).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    tracing::warn!(
                        message_id = %item.message_id,
                        filename = %att.filename,
                        error = %err,
                        "Failed to fetch attachment, skipping its unit"
                    );
                    summary.attachments_skipped += 1;
                    continue;
                }
            };
            let resolved = ResolvedAttachment::new(att.clone(), bytes);

            let subject = Some(item.subject.as_str()).filter(|s| !s.trim().is_empty());
            let display_name = clean_attachment_name(&att.filename, subject);
            let (display_stem, ext) = split_extension(&display_name);
            let att_slug = sanitize_segment(display_stem, limits.max_attachment_len, "attachment");

            // One allocation names all three files of the unit.
            let stem = alloc.allocate(&folder, &format!("{date}_{subject_slug}_{att_slug}"));
            let raw_name = match ext {
                Some(ext) => format!("{stem}.{ext}"),
                None => stem.clone(),
            };
            write_unit(
                sink,
                &folder,
                &stem,
                item,
                &entity_name,
                Some(&resolved),
                Some(&raw_name),
                &splicer,
                &mut summary,
            )?;
        }
    }

    if let Some(report) = progress {
        report(total, total);
    }
    sink.finalize()?;
    Ok(summary)
}

/// Suggested file name for a new archive, e.g. `email_archive_2024-03-15.zip`.
pub fn suggested_archive_name(prefix: &str, date: NaiveDate) -> String {
    format!("{prefix}_{}.zip", date.format("%Y-%m-%d"))
}

fn validate(items: &[SelectedItem]) -> Result<()> {
    if items.is_empty() {
        return Err(BundleError::EmptySelection);
    }
    for item in items {
        if item.message_id.trim().is_empty() {
            return Err(BundleError::InvalidItem {
                message_id: item.message_id.clone(),
                reason: "empty messageId".into(),
            });
        }
        if item.account_ref.trim().is_empty() {
            return Err(BundleError::InvalidItem {
                message_id: item.message_id.clone(),
                reason: "empty accountRef".into(),
            });
        }
        for att in &item.attachments {
            if att.id.trim().is_empty() {
                return Err(BundleError::InvalidItem {
                    message_id: item.message_id.clone(),
                    reason: format!("attachment {:?} has an empty id", att.filename),
                });
            }
        }
    }
    Ok(())
}

/// Upstream-resolved entity name wins; otherwise run the matcher; otherwise
/// the `Unknown` bucket.
fn resolve_entity_name(item: &SelectedItem, table: &[(String, Pattern)]) -> String {
    if let Some(name) = item.entity_name.as_deref() {
        let name = name.trim();
        if !name.is_empty() {
            return name.to_string();
        }
    }
    let address = entity::sender_address(&item.from);
    entity::match_entity(&address, table)
        .unwrap_or(ENTITY_FALLBACK)
        .to_string()
}

/// Compose and write all files of one unit.
#[allow(clippy::too_many_arguments)]
fn write_unit(
    sink: &mut dyn ArchiveSink,
    folder: &str,
    stem: &str,
    item: &SelectedItem,
    entity_name: &str,
    target: Option<&ResolvedAttachment>,
    raw_name: Option<&str>,
    splicer: &dyn PdfSplicer,
    summary: &mut ArchiveSummary,
) -> Result<()> {
    let composed = match compose_combined_pdf(item, entity_name, target, splicer) {
        Ok(composed) => composed,
        Err(err) => {
            tracing::warn!(
                message_id = %item.message_id,
                error = %err,
                "Failed to compose combined document, skipping unit"
            );
            summary.units_skipped += 1;
            return Ok(());
        }
    };
    if matches!(
        composed.preview,
        PreviewOutcome::PdfSkipped | PreviewOutcome::ImageFallback
    ) {
        summary.previews_skipped += 1;
    }

    let record = build_record(item, entity_name, raw_name.map(str::to_string));
    let json = match record_bytes(&record) {
        Ok(json) => json,
        Err(err) => {
            tracing::warn!(
                message_id = %item.message_id,
                error = %err,
                "Failed to serialize unit record, skipping unit"
            );
            summary.units_skipped += 1;
            return Ok(());
        }
    };

    if let (Some(att), Some(raw_name)) = (target, raw_name) {
        sink.write(&format!("{folder}/{raw_name}"), &att.bytes)?;
        summary.files_written += 1;
    }
    sink.write(&format!("{folder}/{stem}_COMBINED.pdf"), &composed.bytes)?;
    summary.files_written += 1;
    sink.write(&format!("{folder}/{stem}_COMBINED.json"), &json)?;
    summary.files_written += 1;

    summary.units += 1;
    Ok(())
}
