use chrono::{NaiveDate, TimeZone, Utc};
use proptest::prelude::*;
use windbal_core::codec::FIELDS_PER_RECORD;
use windbal_core::{
    CalibrationModel, Category, ChannelGroup, DecodeError, Orientation, ScanLayout, decode,
    decode_in,
};

#[derive(Debug, Clone)]
struct Record {
    value: f64,
    y: i32,
    mo: u32,
    d: u32,
    h: u32,
    mi: u32,
    s: u32,
    ms: u32,
}

impl Record {
    fn render(&self) -> String {
        format!(
            "{:+.6E},{},{},{},{},{},{}.{:03}",
            self.value, self.y, self.mo, self.d, self.h, self.mi, self.s, self.ms
        )
    }

    fn epoch(&self) -> f64 {
        let t = Utc
            .from_utc_datetime(
                &NaiveDate::from_ymd_opt(self.y, self.mo, self.d)
                    .unwrap()
                    .and_hms_milli_opt(self.h, self.mi, self.s, self.ms)
                    .unwrap(),
            )
            .timestamp_micros();
        t as f64 / 1e6
    }
}

fn record() -> impl Strategy<Value = Record> {
    (
        -1.0e-2f64..1.0e-2,
        2000i32..2100,
        1u32..=12,
        1u32..=28,
        0u32..24,
        0u32..60,
        0u32..60,
        0u32..1000,
    )
        .prop_map(|(value, y, mo, d, h, mi, s, ms)| Record {
            value,
            y,
            mo,
            d,
            h,
            mi,
            s,
            ms,
        })
}

proptest! {
    #[test]
    fn decode_returns_one_reading_per_record(records in prop::collection::vec(record(), 1..16)) {
        let resp = records.iter().map(Record::render).collect::<Vec<_>>().join(",");
        let s = decode_in(&resp, records.len(), &Utc).unwrap();
        prop_assert_eq!(s.values.len(), records.len());
        prop_assert_eq!(s.timestamps.len(), records.len());
        for (r, ts) in records.iter().zip(&s.timestamps) {
            prop_assert!((ts - r.epoch()).abs() < 1e-6);
        }
    }

    #[test]
    fn ragged_or_short_responses_are_malformed(
        records in prop::collection::vec(record(), 1..8),
        extra in 1usize..FIELDS_PER_RECORD,
    ) {
        let mut resp = records.iter().map(Record::render).collect::<Vec<_>>().join(",");
        for _ in 0..extra {
            resp.push_str(",0");
        }
        let ragged = decode(&resp, records.len());
        let is_malformed = matches!(ragged, Err(DecodeError::MalformedRecord { .. }));
        prop_assert!(is_malformed);

        let whole = records.iter().map(Record::render).collect::<Vec<_>>().join(",");
        let short = decode(&whole, records.len() + 1);
        let is_malformed = matches!(short, Err(DecodeError::MalformedRecord { .. }));
        prop_assert!(is_malformed);
    }

    #[test]
    fn split_then_flatten_round_trips(
        counts in prop::array::uniform4(0usize..6),
        seed in any::<u32>(),
    ) {
        let mut next = 0u16;
        let groups: Vec<ChannelGroup> = Category::ALL
            .iter()
            .zip(counts)
            .map(|(&cat, n)| {
                let ids: Vec<u16> = (0..n).map(|_| { next += 1; next }).collect();
                ChannelGroup::new(cat, ids)
            })
            .collect();
        let layout = ScanLayout::resolve(&groups);
        let total: usize = counts.iter().sum();
        prop_assert_eq!(layout.len(), total);

        let values: Vec<f64> = (0..total).map(|i| f64::from(seed) + i as f64 * 0.5).collect();
        let stamps: Vec<f64> = (0..total).map(|i| 1.7e9 + i as f64).collect();
        let grouped = layout.split(&values, &stamps).unwrap();
        let (v, t) = grouped.flatten();
        prop_assert_eq!(v, values);
        prop_assert_eq!(t, stamps);
        for slot in 0..total {
            let (cat, idx) = layout.locate(slot).unwrap();
            prop_assert_eq!(grouped.values(cat)[idx], f64::from(seed) + slot as f64 * 0.5);
        }
    }

    #[test]
    fn calibrate_is_bit_identical_on_repeat(
        raw in prop::array::uniform3(-1.0e-2f64..1.0e-2),
        side in any::<bool>(),
    ) {
        let m = CalibrationModel::default();
        m.set_orientation(if side { Orientation::Side } else { Orientation::Normal });
        let a = m.calibrate(raw);
        let b = m.calibrate(raw);
        prop_assert_eq!(a.map(f64::to_bits), b.map(f64::to_bits));
        prop_assert!(a.iter().all(|v| v.is_finite()));
    }
}
