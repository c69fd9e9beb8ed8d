//! Pagination on top of an unordered, cursor-less listing stream.
//!
//! The backend only offers "give me everything, in your order". A page is
//! built by reading that stream lazily: narrow by prefix, skip up to and
//! including the marker, pull a bounded window of records, resolve and
//! filter them, sort every match, then keep the first `limit`.
//!
//! `nextMarker` is the page member furthest along in listing order. Without
//! a filter the window holds exactly the page, so following markers visits
//! every record once. With a filter, matches inside the window that sort
//! below the page but sit before the marker are not revisited.

use crate::{
    models::{
        listing::{ListingPage, ListingQuery, SortBy, SortOrder},
        object::{FileEntry, ObjectRecord},
    },
    services::object_store::StoreResult,
};
use futures::{Stream, TryStreamExt, pin_mut};
use std::cmp::Ordering;
use tracing::debug;

/// Build one page from a raw listing stream.
///
/// `resolve` maps a record to its client view, or `None` when the record
/// cannot be addressed (such records are dropped).
pub async fn collect_page<S, F>(
    records: S,
    query: &ListingQuery,
    mut resolve: F,
) -> StoreResult<ListingPage>
where
    S: Stream<Item = StoreResult<ObjectRecord>>,
    F: FnMut(ObjectRecord) -> Option<FileEntry>,
{
    pin_mut!(records);

    let window = query.fetch_window();
    let mut resumed = query.marker.is_none();
    let mut scanned = 0usize;
    // (listing position, entry)
    let mut matched: Vec<(usize, FileEntry)> = Vec::with_capacity(window);

    while scanned < window {
        let Some(record) = records.try_next().await? else {
            break;
        };
        if let Some(prefix) = query.prefix.as_deref() {
            if !record.key.starts_with(prefix) {
                continue;
            }
        }
        if !resumed {
            resumed = query.marker.as_deref() == Some(record.key.as_str());
            continue;
        }
        let position = scanned;
        scanned += 1;

        let Some(entry) = resolve(record) else {
            continue;
        };
        if query.filter.matches(&entry) {
            matched.push((position, entry));
        }
    }

    if !resumed {
        debug!(
            "marker {:?} not present in listing, returning empty page",
            query.marker
        );
    }

    let total_found = matched.len();
    matched.sort_by(|(_, a), (_, b)| ordering(query.sort_by, query.sort_order, a, b));
    matched.truncate(query.limit);

    let has_more = query.limit > 0 && matched.len() == query.limit;
    let next_marker = if has_more {
        matched
            .iter()
            .max_by_key(|(position, _)| *position)
            .map(|(_, entry)| entry.object_name.clone())
    } else {
        None
    };

    Ok(ListingPage {
        files: matched.into_iter().map(|(_, entry)| entry).collect(),
        next_marker,
        has_more,
        total_found,
    })
}

/// Page comparator. `sort_by` is stable, so entries comparing equal keep
/// their listing order in both directions.
fn ordering(by: SortBy, order: SortOrder, a: &FileEntry, b: &FileEntry) -> Ordering {
    let ordering = by.compare(a, b);
    match order {
        SortOrder::Asc => ordering,
        SortOrder::Desc => ordering.reverse(),
    }
}
