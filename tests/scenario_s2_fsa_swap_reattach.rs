//! S2 — a DIR_CONFIG reread adds one new host at position 0: the FSA swap
//! publishes a new generation with the new host list, and a reader that
//! was attached to the old generation transparently reattaches and finds
//! its previously-tracked host at its new index.

use afd_fabric::area::fsa::HostEntry;
use afd_fabric::area::{AreaKind, MappedArea};

#[test]
fn swap_inserts_host_at_front_and_reader_reattaches_to_shifted_index() {
    let tmp = tempfile::tempdir().unwrap();
    let base = tmp.path().join("FSA_STAT_FILE");

    let h1 = HostEntry::new("h1", 1);
    let mut writer: MappedArea<HostEntry> = MappedArea::create(AreaKind::Fsa, &base, 1, &[h1]).unwrap();

    let mut reader: MappedArea<HostEntry> = MappedArea::attach(AreaKind::Fsa, &base).unwrap();
    assert_eq!(reader.entry_count(), 1);
    assert_eq!(reader.entry(0).alias, "h1");

    writer
        .swap(1, |old| {
            let mut next = vec![HostEntry::new("h2", 1)];
            next.extend(old.iter().cloned());
            next
        })
        .unwrap();

    assert_eq!(writer.entries()[0].alias, "h2");
    assert_eq!(writer.entries()[1].alias, "h1");

    assert!(reader.is_stale());
    assert!(reader.reattach_if_stale().unwrap());
    assert_eq!(reader.entry(0).alias, "h2");
    assert_eq!(reader.entry(1).alias, "h1");
}
