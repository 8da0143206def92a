//! Order numbers.
//!
//! An order number is 26 decimal digits: the UTC time to the second (14 digits), the node id (3 digits), a
//! per-process sequence (6 digits) and a random suffix (3 digits), e.g. `20241001153012` `007` `000042` `318`.
//!
//! The sequence alone keeps numbers from one node unique unless a million are issued within one second. The node id
//! separates engine instances, and the random suffix covers restarts within the same second. The database enforces
//! uniqueness as a last resort; on the rare collision the engine generates a fresh number and tries again.
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::db_types::OrderNo;

pub const ORDER_NO_LENGTH: usize = 26;
const SEQUENCE_MODULUS: u32 = 1_000_000;

#[derive(Debug)]
pub struct OrderNoGenerator {
    node_id: u16,
    sequence: AtomicU32,
}

impl OrderNoGenerator {
    /// `node_id` is reduced to its last three digits.
    pub fn new(node_id: u16) -> Self {
        Self { node_id: node_id % 1000, sequence: AtomicU32::new(0) }
    }

    pub fn node_id(&self) -> u16 {
        self.node_id
    }

    pub fn next(&self) -> OrderNo {
        self.next_at(Utc::now())
    }

    pub fn next_at(&self, now: DateTime<Utc>) -> OrderNo {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) % SEQUENCE_MODULUS;
        let suffix = rand::thread_rng().gen_range(0..1000);
        OrderNo(format!("{}{:03}{seq:06}{suffix:03}", now.format("%Y%m%d%H%M%S"), self.node_id))
    }
}

#[cfg(test)]
mod test {
    use std::{collections::HashSet, sync::Arc};

    use chrono::TimeZone;

    use super::*;

    #[test]
    fn format() {
        let gen = OrderNoGenerator::new(1007);
        let at = Utc.with_ymd_and_hms(2024, 10, 1, 15, 30, 12).unwrap();
        let no = gen.next_at(at);
        assert_eq!(no.as_str().len(), ORDER_NO_LENGTH);
        assert!(no.as_str().starts_with("20241001153012007000000"));
        assert!(no.as_str().chars().all(|c| c.is_ascii_digit()));
        let no = gen.next_at(at);
        assert!(no.as_str().starts_with("20241001153012007000001"));
    }

    #[test]
    fn unique_across_threads() {
        let gen = Arc::new(OrderNoGenerator::new(1));
        let at = Utc::now();
        let handles = (0..8)
            .map(|_| {
                let gen = Arc::clone(&gen);
                std::thread::spawn(move || (0..500).map(|_| gen.next_at(at)).collect::<Vec<_>>())
            })
            .collect::<Vec<_>>();
        let all = handles.into_iter().flat_map(|h| h.join().unwrap()).collect::<Vec<_>>();
        let unique = all.iter().collect::<HashSet<_>>();
        assert_eq!(unique.len(), 4000);
    }
}
