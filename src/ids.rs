//! Opaque, prefixed, lexicographically-sortable entity identifiers.
//!
//! Every entity id is `<prefix>_<ULID>`. ULIDs encode creation time in their
//! leading 48 bits and are lexicographically sortable. Message ids use a
//! single process-wide monotonic generator so that two messages created in
//! the same millisecond still sort in call order — satisfying "lexical order
//! equals insertion order within a topic" even under load.

use std::sync::Mutex;

use once_cell::sync::Lazy;
use ulid::{Generator, Ulid};

macro_rules! id_kind {
    ($name:ident, $prefix:expr) => {
        #[doc = concat!("Generate a fresh ", $prefix, "_<ULID> identifier.")]
        pub fn $name() -> String {
            format!(concat!($prefix, "_{}"), Ulid::new())
        }
    };
}

id_kind!(new_channel_id, "ch");
id_kind!(new_topic_id, "tp");
id_kind!(new_attachment_id, "att");
id_kind!(new_enrichment_id, "enr");

static MESSAGE_ID_GENERATOR: Lazy<Mutex<Generator>> = Lazy::new(|| Mutex::new(Generator::new()));

/// Generate a fresh monotonic `msg_<ULID>` identifier.
///
/// Uses a single shared [`Generator`] rather than [`Ulid::new`] so that
/// message ids generated within the same millisecond still compare in
/// generation order.
pub fn new_message_id() -> String {
    let ulid = MESSAGE_ID_GENERATOR
        .lock()
        .expect("message id generator mutex poisoned")
        .generate()
        .expect("ulid monotonic counter exhausted within this millisecond");
    format!("msg_{ulid}")
}

/// A fresh process-wide database identity, assigned once at first initialization.
pub fn new_db_id() -> String {
    format!("db_{}", Ulid::new())
}

/// A fresh identity for one running daemon process, distinct from `db_id`
/// (the workspace's identity) and regenerated on every startup.
pub fn new_instance_id() -> String {
    format!("in_{}", Ulid::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_carry_expected_prefix() {
        assert!(new_channel_id().starts_with("ch_"));
        assert!(new_topic_id().starts_with("tp_"));
        assert!(new_message_id().starts_with("msg_"));
        assert!(new_attachment_id().starts_with("att_"));
        assert!(new_enrichment_id().starts_with("enr_"));
        assert!(new_instance_id().starts_with("in_"));
    }

    #[test]
    fn successive_message_ids_sort_in_generation_order_even_same_millisecond() {
        let ids: Vec<String> = (0..50).map(|_| new_message_id()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted, "message ids must sort in generation order");
    }
}
