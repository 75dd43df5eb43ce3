mod common;

use common::*;
use cxl_mailbox::opcode::*;
use cxl_mailbox::{MailboxStatus, MemoryDeviceConfig, PoisonKind, POISON_LIST_LIMIT};

fn clear_request(dpa: u64, fill: u8) -> Vec<u8> {
    let mut req = dpa.to_le_bytes().to_vec();
    req.extend_from_slice(&[fill; 64]);
    req
}

fn list(h: &mut Harness, start: u64, lines: u64) -> (u8, Vec<(u64, u32)>) {
    let resp = h.send(GET_POISON_LIST, &range_request(start, lines));
    assert_eq!(resp.status, MailboxStatus::Success);
    let p = &resp.payload;
    let count = u16_at(p, 10) as usize;
    assert_eq!(p.len(), 32 + count * 16);
    let records = p[32..]
        .chunks_exact(16)
        .map(|r| (u64_at(r, 0), u32_at(r, 8)))
        .collect();
    (p[0], records)
}

#[test]
fn inject_list_clear() {
    let mut h = memdev(0, 256 * MIB);
    assert_eq!(h.send(INJECT_POISON, &0x4000u64.to_le_bytes()).status, MailboxStatus::Success);
    assert_eq!(h.send(INJECT_POISON, &0x4000u64.to_le_bytes()).status, MailboxStatus::Success);

    let (flags, records) = list(&mut h, 0, 0x1000);
    assert_eq!(flags, 0);
    assert_eq!(records, vec![(0x4000 | PoisonKind::Injected as u64, 1)]);

    assert_eq!(h.send(CLEAR_POISON, &clear_request(0x4000, 0xa5)).status, MailboxStatus::Success);
    assert_eq!(
        h.backend.lock().unwrap().cacheline(0x4000),
        Some(&[0xa5; 64])
    );
    assert!(list(&mut h, 0, 0x1000).1.is_empty());

    // Clearing a healthy line still writes the data.
    assert_eq!(h.send(CLEAR_POISON, &clear_request(0x8000, 0x11)).status, MailboxStatus::Success);
    assert_eq!(h.backend.lock().unwrap().cacheline(0x8000), Some(&[0x11; 64]));
}

#[test]
fn list_rejects_unaligned_start() {
    let mut h = memdev(0, 256 * MIB);
    h.send(INJECT_POISON, &0u64.to_le_bytes());
    let resp = h.send(GET_POISON_LIST, &range_request(0x10, 4));
    assert_eq!(resp.status, MailboxStatus::InvalidInput);
    assert!(resp.payload.is_empty());
}

#[test]
fn list_clips_records_to_query() {
    let mut h = memdev(0, 256 * MIB);
    h.ctx.record_media_error(0x1000, 0x400, PoisonKind::Vendor);
    let (_, records) = list(&mut h, 0x1100, 4);
    assert_eq!(records, vec![(0x1100 | PoisonKind::Vendor as u64, 4)]);
}

#[test]
fn clear_splits_media_error() {
    let mut h = memdev(0, 256 * MIB);
    h.ctx.record_media_error(0x2000, 4 * 64, PoisonKind::Internal);
    h.send(CLEAR_POISON, &clear_request(0x2080, 0));
    let (_, records) = list(&mut h, 0, 0x1000);
    assert_eq!(
        records,
        vec![
            (0x2000 | PoisonKind::Internal as u64, 2),
            (0x20c0 | PoisonKind::Internal as u64, 1),
        ]
    );
}

#[test]
fn clear_checks_capacity() {
    let mut h = memdev(0, 256 * MIB);
    assert_eq!(
        h.send(CLEAR_POISON, &clear_request(256 * MIB - 64, 0)).status,
        MailboxStatus::Success
    );
    assert_eq!(
        h.send(CLEAR_POISON, &clear_request(256 * MIB, 0)).status,
        MailboxStatus::InvalidPhysicalAddress
    );
    assert_eq!(
        h.send(CLEAR_POISON, &clear_request(u64::MAX - 63, 0)).status,
        MailboxStatus::InvalidPhysicalAddress
    );
}

#[test]
fn inject_limit() {
    let mut h = memdev(0, 256 * MIB);
    for i in 0..POISON_LIST_LIMIT as u64 {
        let resp = h.send(INJECT_POISON, &(i * 128).to_le_bytes());
        assert_eq!(resp.status, MailboxStatus::Success);
    }
    let resp = h.send(INJECT_POISON, &(1u64 << 24).to_le_bytes());
    assert_eq!(resp.status, MailboxStatus::InjectPoisonLimit);
    assert_eq!(h.ctx.poison().unwrap().len(), POISON_LIST_LIMIT);
}

#[test]
fn large_lists_are_paginated() {
    let mut h = Harness::new(MemoryDeviceConfig {
        payload_max: 256,
        ..Default::default()
    });
    for i in 0..20u64 {
        h.send(INJECT_POISON, &(i * 128).to_le_bytes());
    }
    let (flags, records) = list(&mut h, 0, 0x1000);
    assert_eq!(records.len(), (256 - 32) / 16);
    assert_eq!(flags & 1, 1);

    let (flags, records) = list(&mut h, 14 * 128, 0x1000);
    assert_eq!(records.len(), 6);
    assert_eq!(flags & 1, 0);
}

#[test]
fn overflow_is_reported_with_timestamp() {
    let mut h = memdev(0, 256 * MIB);
    h.send(TIMESTAMP_SET, &5_000_000u64.to_le_bytes());
    for i in 0..=POISON_LIST_LIMIT as u64 {
        h.ctx.record_media_error(i * 0x1000, 64, PoisonKind::Internal);
    }
    let resp = h.send(GET_POISON_LIST, &range_request(0, 1));
    assert_eq!(resp.payload[0] & 0b10, 0b10);
    assert_eq!(u64_at(&resp.payload, 2), 5_000_000);
}
