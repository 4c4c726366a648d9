//! Behavioral tests for the mailbox ledger and its file store.

use mailbox::{Identity, Ledger, LedgerStore};
use proptest::prelude::*;

fn identity(seed: u8) -> Identity {
    Identity::from_bytes([seed; 20])
}

fn deposits() -> impl Strategy<Value = Vec<(u8, String)>> {
    prop::collection::vec((any::<u8>(), ".{0,24}"), 0..40)
}

proptest! {
    /// Count equals the number of deposits, whatever the content.
    #[test]
    fn count_matches_deposits(letters in deposits()) {
        let mut ledger = Ledger::new();
        for (seed, content) in &letters {
            ledger.deposit(identity(*seed), content.clone());
        }
        prop_assert_eq!(ledger.total_letters(), letters.len() as u64);
        prop_assert_eq!(ledger.read_all().len(), letters.len());
    }

    /// Enumeration returns contents and senders in deposit order.
    #[test]
    fn order_and_attribution_are_preserved(letters in deposits()) {
        let mut ledger = Ledger::new();
        for (seed, content) in &letters {
            ledger.deposit(identity(*seed), content.clone());
        }
        for (letter, (seed, content)) in ledger.read_all().iter().zip(&letters) {
            prop_assert_eq!(letter.content(), content.as_str());
            prop_assert_eq!(letter.sender(), identity(*seed));
        }
    }

    /// Later deposits only append; the existing prefix never changes.
    #[test]
    fn history_is_immutable(before in deposits(), after in deposits()) {
        let mut ledger = Ledger::new();
        for (seed, content) in &before {
            ledger.deposit(identity(*seed), content.clone());
        }
        let prefix = ledger.read_all().to_vec();
        for (seed, content) in &after {
            ledger.deposit(identity(*seed), content.clone());
        }
        prop_assert_eq!(&ledger.read_all()[..prefix.len()], prefix.as_slice());
    }

    /// A strict prefix never shares the full ledger's root, even when the
    /// dropped tail repeats earlier letters.
    #[test]
    fn prefix_roots_differ_from_full_root(
        letters in prop::collection::vec((0u8..2, "[ab]{0,2}"), 1..24),
        cut in any::<prop::sample::Index>(),
    ) {
        let mut full = Ledger::new();
        for (seed, content) in &letters {
            full.deposit(identity(*seed), content.clone());
        }
        let len = cut.index(letters.len() + 1);
        let mut prefix = Ledger::new();
        for (seed, content) in &letters[..len] {
            prefix.deposit(identity(*seed), content.clone());
        }
        if len == letters.len() {
            prop_assert_eq!(prefix.root(), full.root());
        } else {
            prop_assert_ne!(prefix.root(), full.root());
        }
    }
}

#[test]
fn interleaved_senders_keep_their_letters() {
    let alice = identity(0xa1);
    let bob = identity(0xb0);
    let mut ledger = Ledger::new();
    ledger.deposit(alice, "a1");
    ledger.deposit(bob, "b1");
    ledger.deposit(alice, "a2");

    let from_alice: Vec<_> = ledger
        .read_all()
        .iter()
        .filter(|l| l.sender() == alice)
        .map(|l| l.content())
        .collect();
    assert_eq!(from_alice, vec!["a1", "a2"]);
    assert_eq!(ledger.letter(1).map(|l| l.sender()), Some(bob));
}

#[test]
fn store_scenario_matches_in_memory_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let store = LedgerStore::new(dir.path().join("mailbox.json"));
    let hello: Identity = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse().unwrap();
    let world = identity(0xde);

    assert_eq!(store.load().unwrap().total_letters(), 0);
    store.deposit(hello, "Hello").unwrap();
    store.deposit(world, "World").unwrap();

    let mut expected = Ledger::new();
    expected.deposit(hello, "Hello");
    expected.deposit(world, "World");

    let loaded = store.load().unwrap();
    assert_eq!(loaded, expected);
    assert_eq!(loaded.root(), expected.root());
    assert_eq!(store.load().unwrap(), loaded);
}

#[test]
fn unicode_and_multiline_content_survives_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = LedgerStore::new(dir.path().join("mailbox.json"));
    let content = "别人写了一封邮件\n第二行 \"quoted\"";
    store.deposit(identity(1), content).unwrap();
    assert_eq!(store.load().unwrap().read_all()[0].content(), content);
}
