use chrono::Duration;
use uuid::Uuid;

use swap_types::models::{Decision, Identity, Item, ItemFields, Match};

use super::*;

fn user(name: &str) -> Identity {
    Identity {
        user_id: Uuid::new_v4(),
        name: name.to_string(),
    }
}

fn fields(name: &str) -> ItemFields {
    ItemFields {
        name: name.to_string(),
        description: format!("A bag of {}", name),
        location: "Kyoto".to_string(),
        image_url: format!("http://localhost:3000/media/uploads/{}.png", name),
    }
}

fn post(db: &Database, owner: &Identity, name: &str) -> Item {
    db.create_item(owner, &fields(name)).unwrap()
}

fn decide(db: &Database, who: &Identity, item: &Item, liked: bool) -> Recorded {
    match db.record_decision(who, item.id, liked).unwrap() {
        RecordOutcome::Recorded(recorded) => recorded,
        other => panic!("decision not recorded: {:?}", other),
    }
}

fn matches_between(db: &Database, a: &Identity, b: &Identity) -> Vec<Uuid> {
    db.list_matches(a.user_id)
        .unwrap()
        .into_iter()
        .filter(|m| m.other_user.id == b.user_id)
        .map(|m| m.id)
        .collect()
}

fn history(db: &Database, who: &Identity) -> Vec<Decision> {
    db.decision_history(who.user_id)
        .unwrap()
        .into_iter()
        .map(|entry| entry.decision)
        .collect()
}

/// Build the canonical A/"Mochi", B/"Chips" pair and match them.
fn matched_pair(db: &Database) -> (Identity, Identity, Item, Item, Match) {
    let a = user("alice");
    let b = user("bob");
    let mochi = post(db, &a, "Mochi");
    let chips = post(db, &b, "Chips");

    assert!(decide(db, &b, &mochi, true).matched.is_none());
    let recorded = decide(db, &a, &chips, true);
    let m = recorded.matched.expect("second like should match");
    assert!(recorded.created_match);
    (a, b, mochi, chips, m)
}

#[test]
fn mutual_likes_match_in_either_order() {
    for a_first in [true, false] {
        let db = Database::open_in_memory().unwrap();
        let a = user("alice");
        let b = user("bob");
        let mochi = post(&db, &a, "Mochi");
        let chips = post(&db, &b, "Chips");

        let (first, second) = if a_first {
            (decide(&db, &a, &chips, true), decide(&db, &b, &mochi, true))
        } else {
            (decide(&db, &b, &mochi, true), decide(&db, &a, &chips, true))
        };

        assert!(first.matched.is_none());
        let m = second.matched.unwrap();
        let items = [m.item1_id, m.item2_id];
        assert!(items.contains(&mochi.id) && items.contains(&chips.id));
        let sides = [m.user1_id, m.user2_id];
        assert!(sides.contains(&a.user_id) && sides.contains(&b.user_id));

        assert_eq!(matches_between(&db, &a, &b).len(), 1);
        assert_eq!(matches_between(&db, &b, &a).len(), 1);
    }
}

#[test]
fn match_sides_pair_each_user_with_their_own_item() {
    let db = Database::open_in_memory().unwrap();
    let (a, b, mochi, chips, m) = matched_pair(&db);

    // A completed the match, so A is side 1 with A's own item
    assert_eq!(m.user1_id, a.user_id);
    assert_eq!(m.item1_id, mochi.id);
    assert_eq!(m.user2_id, b.user_id);
    assert_eq!(m.item2_id, chips.id);

    let from_b = db.list_matches(b.user_id).unwrap();
    assert_eq!(from_b[0].user_item.id, chips.id);
    assert_eq!(from_b[0].other_user_item.id, mochi.id);
    assert_eq!(from_b[0].other_user.name, "alice");
}

#[test]
fn repeated_like_does_not_duplicate_match() {
    let db = Database::open_in_memory().unwrap();
    let (a, b, _mochi, chips, m) = matched_pair(&db);

    let again = decide(&db, &a, &chips, true);
    assert!(!again.created_match);
    assert_eq!(again.matched.unwrap().id, m.id);
    assert_eq!(matches_between(&db, &a, &b), vec![m.id]);
    // Upsert keeps a single decision row per (user, item)
    assert_eq!(history(&db, &a).len(), 1);
}

#[test]
fn earliest_reciprocal_like_wins() {
    let db = Database::open_in_memory().unwrap();
    let a = user("alice");
    let b = user("bob");
    let mochi = post(&db, &a, "Mochi");
    let dango = post(&db, &a, "Dango");
    let chips = post(&db, &b, "Chips");

    decide(&db, &b, &dango, true);
    decide(&db, &b, &mochi, true);
    let m = decide(&db, &a, &chips, true).matched.unwrap();
    assert_eq!(m.item1_id, dango.id);
}

#[test]
fn dislike_does_not_match() {
    let db = Database::open_in_memory().unwrap();
    let a = user("alice");
    let b = user("bob");
    let mochi = post(&db, &a, "Mochi");
    let chips = post(&db, &b, "Chips");

    decide(&db, &b, &mochi, false);
    assert!(decide(&db, &a, &chips, true).matched.is_none());
    assert!(matches_between(&db, &a, &b).is_empty());
}

#[test]
fn turning_like_into_dislike_drops_match() {
    let db = Database::open_in_memory().unwrap();
    let (a, b, _mochi, chips, m) = matched_pair(&db);

    let revised = decide(&db, &a, &chips, false);
    assert_eq!(revised.removed_matches, vec![m.id]);
    assert!(!revised.decision.liked);
    assert!(matches_between(&db, &a, &b).is_empty());
}

#[test]
fn cannot_decide_on_own_or_missing_item() {
    let db = Database::open_in_memory().unwrap();
    let a = user("alice");
    let mochi = post(&db, &a, "Mochi");

    assert!(matches!(
        db.record_decision(&a, mochi.id, true).unwrap(),
        RecordOutcome::OwnItem
    ));
    assert!(matches!(
        db.record_decision(&a, Uuid::new_v4(), true).unwrap(),
        RecordOutcome::ItemMissing
    ));
}

#[test]
fn undoing_second_decision_removes_match_and_messages() {
    let db = Database::open_in_memory().unwrap();
    let (a, b, _mochi, chips, m) = matched_pair(&db);

    db.post_message(a.user_id, m.id, "hi!").unwrap().unwrap();
    db.post_message(b.user_id, m.id, "hello").unwrap().unwrap();
    assert_eq!(db.message_count(m.id).unwrap(), 2);

    let second = history(&db, &a)
        .into_iter()
        .find(|d| d.item_id == chips.id)
        .unwrap();
    let outcome = db.undo_decision(a.user_id, second.id).unwrap().unwrap();

    assert_eq!(outcome.removed_matches, vec![m.id]);
    assert!(db.find_match_for(a.user_id, m.id).unwrap().is_none());
    assert_eq!(db.message_count(m.id).unwrap(), 0);
    assert!(history(&db, &a).is_empty());
    // The counterpart's decision is untouched by a single undo
    assert_eq!(history(&db, &b).len(), 1);
}

#[test]
fn undoing_first_decision_also_removes_match() {
    let db = Database::open_in_memory().unwrap();
    let (a, b, mochi, _chips, m) = matched_pair(&db);

    let first = history(&db, &b)
        .into_iter()
        .find(|d| d.item_id == mochi.id)
        .unwrap();
    let outcome = db.undo_decision(b.user_id, first.id).unwrap().unwrap();

    assert_eq!(outcome.removed_matches, vec![m.id]);
    assert!(matches_between(&db, &a, &b).is_empty());
}

#[test]
fn undo_requires_ownership() {
    let db = Database::open_in_memory().unwrap();
    let (a, b, _mochi, _chips, m) = matched_pair(&db);

    let theirs = history(&db, &b)[0].id;
    assert!(db.undo_decision(a.user_id, theirs).unwrap().is_none());
    assert!(db.undo_decision(a.user_id, Uuid::new_v4()).unwrap().is_none());
    assert!(db.find_match_for(a.user_id, m.id).unwrap().is_some());
}

#[test]
fn unmatch_resets_whole_relationship() {
    let db = Database::open_in_memory().unwrap();
    let (a, b, _mochi, chips, m) = matched_pair(&db);
    // Extra decisions outside the matched pair
    let crisps = post(&db, &b, "Crisps");
    decide(&db, &a, &crisps, false);
    let carol = user("carol");
    let tea = post(&db, &carol, "Tea");
    decide(&db, &a, &tea, true);

    db.post_message(b.user_id, m.id, "swap?").unwrap();

    let outcome = db.unmatch(b.user_id, m.id).unwrap().unwrap();
    assert_eq!(outcome.removed_matches, vec![m.id]);
    assert_eq!(outcome.removed_decisions, 3);

    assert!(db.list_matches(a.user_id).unwrap().is_empty());
    assert!(db.list_matches(b.user_id).unwrap().is_empty());
    assert_eq!(db.message_count(m.id).unwrap(), 0);
    assert!(history(&db, &b).is_empty());
    // Decisions on third parties survive
    let left = history(&db, &a);
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].item_id, tea.id);

    let feed: Vec<Uuid> = db.feed(a.user_id, 10).unwrap().iter().map(|i| i.id).collect();
    assert!(feed.contains(&chips.id));
    assert!(feed.contains(&crisps.id));
}

#[test]
fn failed_unmatch_and_undo_roll_back_completely() {
    let db = Database::open_in_memory().unwrap();
    let (a, b, _mochi, chips, m) = matched_pair(&db);
    db.post_message(a.user_id, m.id, "hi!").unwrap().unwrap();
    db.post_message(b.user_id, m.id, "hello").unwrap().unwrap();

    // Both operations delete the match before touching decisions, so a
    // failing decision delete lands after a partial write.
    db.with_conn(|conn| {
        conn.execute_batch(
            "CREATE TEMP TRIGGER block_decision_delete BEFORE DELETE ON decisions
             BEGIN SELECT RAISE(ABORT, 'decision deletes blocked'); END;",
        )?;
        Ok(())
    })
    .unwrap();

    assert!(db.unmatch(b.user_id, m.id).is_err());
    assert!(db.find_match_for(a.user_id, m.id).unwrap().is_some());
    assert_eq!(db.message_count(m.id).unwrap(), 2);
    assert_eq!(history(&db, &a).len(), 1);
    assert_eq!(history(&db, &b).len(), 1);

    let like = history(&db, &a)
        .into_iter()
        .find(|d| d.item_id == chips.id)
        .unwrap();
    assert!(db.undo_decision(a.user_id, like.id).is_err());
    assert!(db.find_match_for(b.user_id, m.id).unwrap().is_some());
    assert_eq!(db.message_count(m.id).unwrap(), 2);
    assert_eq!(history(&db, &a).len(), 1);

    // The connection is usable again once the blocker is gone
    db.with_conn(|conn| {
        conn.execute_batch("DROP TRIGGER block_decision_delete;")?;
        Ok(())
    })
    .unwrap();
    let outcome = db.unmatch(b.user_id, m.id).unwrap().unwrap();
    assert_eq!(outcome.removed_matches, vec![m.id]);
    assert_eq!(db.message_count(m.id).unwrap(), 0);
}

#[test]
fn rematch_after_unmatch_creates_fresh_match() {
    let db = Database::open_in_memory().unwrap();
    let (a, b, mochi, chips, m) = matched_pair(&db);

    db.unmatch(a.user_id, m.id).unwrap().unwrap();

    decide(&db, &b, &mochi, true);
    let fresh = decide(&db, &a, &chips, true).matched.unwrap();
    assert_ne!(fresh.id, m.id);
    assert_eq!(matches_between(&db, &a, &b), vec![fresh.id]);
}

#[test]
fn unmatch_requires_participant() {
    let db = Database::open_in_memory().unwrap();
    let (_a, _b, _mochi, _chips, m) = matched_pair(&db);
    let mallory = user("mallory");

    assert!(db.unmatch(mallory.user_id, m.id).unwrap().is_none());
    assert!(db.unmatch(mallory.user_id, Uuid::new_v4()).unwrap().is_none());
}

#[test]
fn feed_excludes_own_and_decided_items() {
    let db = Database::open_in_memory().unwrap();
    let a = user("alice");
    let b = user("bob");
    let mine = post(&db, &a, "Mochi");
    let liked = post(&db, &b, "Chips");
    let passed = post(&db, &b, "Crisps");
    let fresh = post(&db, &b, "Pocky");

    decide(&db, &a, &liked, true);
    decide(&db, &a, &passed, false);

    let feed: Vec<Uuid> = db.feed(a.user_id, 10).unwrap().iter().map(|i| i.id).collect();
    assert_eq!(feed, vec![fresh.id]);
    assert!(!feed.contains(&mine.id));
}

#[test]
fn feed_is_capped() {
    let db = Database::open_in_memory().unwrap();
    let a = user("alice");
    let b = user("bob");
    for i in 0..15 {
        post(&db, &b, &format!("snack-{}", i));
    }
    assert_eq!(db.feed(a.user_id, 10).unwrap().len(), 10);
}

#[test]
fn reading_marks_counterpart_messages_once() {
    let db = Database::open_in_memory().unwrap();
    let (a, b, _mochi, _chips, m) = matched_pair(&db);

    db.post_message(a.user_id, m.id, "one").unwrap();
    db.post_message(b.user_id, m.id, "two").unwrap();

    // A's read flags B's message, not A's own
    let read = db.read_messages(a.user_id, m.id, None).unwrap().unwrap();
    assert_eq!(read.len(), 2);
    assert_eq!(read[0].content, "one");
    assert!(!read[0].read);
    assert!(read[1].read);

    let again = db.read_messages(a.user_id, m.id, None).unwrap().unwrap();
    assert!(!again[0].read);
    assert!(again[1].read);

    // B reading now flags A's message
    let from_b = db.read_messages(b.user_id, m.id, None).unwrap().unwrap();
    assert!(from_b.iter().all(|msg| msg.read));
}

#[test]
fn since_returns_only_newer_messages() {
    let db = Database::open_in_memory().unwrap();
    let (a, b, _mochi, _chips, m) = matched_pair(&db);

    let first = db.post_message(a.user_id, m.id, "one").unwrap().unwrap();
    let second = db.post_message(b.user_id, m.id, "two").unwrap().unwrap();
    assert!(second.created_at > first.created_at);

    let newer = db
        .read_messages(a.user_id, m.id, Some(first.created_at))
        .unwrap()
        .unwrap();
    assert_eq!(newer.len(), 1);
    assert_eq!(newer[0].id, second.id);

    let none = db
        .read_messages(a.user_id, m.id, Some(second.created_at + Duration::seconds(1)))
        .unwrap()
        .unwrap();
    assert!(none.is_empty());
}

#[test]
fn message_timestamps_strictly_increase() {
    let db = Database::open_in_memory().unwrap();
    let (a, _b, _mochi, _chips, m) = matched_pair(&db);

    let stamps: Vec<_> = (0..20)
        .map(|i| {
            db.post_message(a.user_id, m.id, &format!("burst {}", i))
                .unwrap()
                .unwrap()
                .created_at
        })
        .collect();
    assert!(stamps.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn outsiders_cannot_post_or_read() {
    let db = Database::open_in_memory().unwrap();
    let (_a, _b, _mochi, _chips, m) = matched_pair(&db);
    let mallory = user("mallory");

    assert!(db.post_message(mallory.user_id, m.id, "hey").unwrap().is_none());
    assert!(db.read_messages(mallory.user_id, m.id, None).unwrap().is_none());
    assert_eq!(db.message_count(m.id).unwrap(), 0);
}

#[test]
fn deleting_item_cascades_to_decisions_matches_and_messages() {
    let db = Database::open_in_memory().unwrap();
    let (a, b, mochi, _chips, m) = matched_pair(&db);
    db.post_message(a.user_id, m.id, "bye").unwrap();

    let deleted = match db.delete_item(a.user_id, mochi.id).unwrap() {
        Ownership::Owned(deleted) => deleted,
        other => panic!("unexpected {:?}", other),
    };
    assert_eq!(deleted.image_url, mochi.image_url);
    assert_eq!(deleted.removed_matches, vec![m.id]);

    assert!(db.get_item(mochi.id).unwrap().is_none());
    assert!(history(&db, &b).is_empty());
    assert!(db.list_matches(a.user_id).unwrap().is_empty());
    assert_eq!(db.message_count(m.id).unwrap(), 0);
}

#[test]
fn item_updates_and_deletes_are_owner_only() {
    let db = Database::open_in_memory().unwrap();
    let a = user("alice");
    let b = user("bob");
    let mochi = post(&db, &a, "Mochi");

    assert!(matches!(
        db.update_item(b.user_id, mochi.id, &fields("Stolen")).unwrap(),
        Ownership::NotOwner
    ));
    assert!(matches!(
        db.delete_item(b.user_id, mochi.id).unwrap(),
        Ownership::NotOwner
    ));
    assert!(matches!(
        db.update_item(a.user_id, Uuid::new_v4(), &fields("Ghost")).unwrap(),
        Ownership::Missing
    ));

    let updated = match db.update_item(a.user_id, mochi.id, &fields("Daifuku")).unwrap() {
        Ownership::Owned(item) => item,
        other => panic!("unexpected {:?}", other),
    };
    assert_eq!(updated.name, "Daifuku");
    assert_eq!(updated.created_at, mochi.created_at);
    assert!(updated.updated_at >= mochi.updated_at);
    assert_eq!(db.list_items(a.user_id).unwrap().len(), 1);
}

#[test]
fn user_projection_tracks_latest_name() {
    let db = Database::open_in_memory().unwrap();
    let mut a = user("alice");
    let b = user("bob");
    let mochi = post(&db, &a, "Mochi");
    decide(&db, &b, &mochi, true);

    // Any write by an identity refreshes its projected name
    a.name = "alice b.".to_string();
    post(&db, &a, "Pocky");

    let entries = db.decision_history(b.user_id).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].owner.id, a.user_id);
    assert_eq!(entries[0].owner.name, "alice b.");
    assert_eq!(entries[0].owner.image, None);
}
