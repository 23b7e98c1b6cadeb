use rand::{prelude::random, rngs::SmallRng, Rng, SeedableRng};

use std::collections::BTreeMap;

use super::*;
use crate::record::Value;

fn key_of(rng: &mut SmallRng, key_max: u64) -> Vec<u8> {
    format!("key-{:08}", rng.gen::<u64>() % key_max).into_bytes()
}

#[test]
fn test_omap_empty() {
    let map = Omap::new();
    assert_eq!(map.len(), 0);
    assert!(map.is_empty());
    assert_eq!(map.get(b"missing"), None);
    assert_eq!(map.iter().count(), 0);
    assert_eq!(map.range(..).count(), 0);
    map.validate().unwrap();
}

#[test]
fn test_omap_set_get() {
    let mut txn = Omap::new().transaction();
    for (i, key) in [&b"b"[..], &b"a"[..], &b"c"[..]].iter().enumerate() {
        let old = txn.set(Record::new(key, Value::from((i as i64) + 1), 1));
        assert!(old.is_none());
    }
    let map = txn.commit();

    assert_eq!(map.len(), 3);
    assert_eq!(map.get(b"a").unwrap().last().value.to_numeric(), Some(2));
    assert_eq!(map.get(b"b").unwrap().last().value.to_numeric(), Some(1));
    assert_eq!(map.get(b"c").unwrap().last().value.to_numeric(), Some(3));
    assert_eq!(map.get(b"d"), None);
    map.validate().unwrap();

    // replace keeps the count and returns the old record.
    let mut txn = map.transaction();
    let old = txn.set(Record::new(b"a", Value::from(42), 2)).unwrap();
    assert_eq!(old.last().value.to_numeric(), Some(2));
    let map2 = txn.commit();
    assert_eq!(map2.len(), 3);
    assert_eq!(map2.get(b"a").unwrap().last().value.to_numeric(), Some(42));
    // prior snapshot is unchanged.
    assert_eq!(map.get(b"a").unwrap().last().value.to_numeric(), Some(2));
}

#[test]
fn test_omap_delete() {
    let mut txn = Omap::new().transaction();
    for key in ["a", "b", "c"].iter() {
        txn.set(Record::new(key.as_bytes(), Value::from(1), 1));
    }
    let map = txn.commit();

    let mut txn = map.transaction();
    assert!(txn.delete(b"x").is_none());
    let old = txn.delete(b"b").unwrap();
    assert_eq!(old.as_key(), b"b");
    let map2 = txn.commit();

    assert_eq!(map2.len(), 2);
    assert_eq!(map2.get(b"b"), None);
    map2.validate().unwrap();
    // prior snapshot is unchanged.
    assert_eq!(map.len(), 3);
    assert!(map.get(b"b").is_some());
}

#[test]
fn test_omap_iter_order() {
    let mut txn = Omap::new().transaction();
    for key in ["d", "b", "e", "a", "c"].iter() {
        txn.set(Record::new(key.as_bytes(), Value::from(0), 1));
    }
    let map = txn.commit();

    let keys: Vec<Vec<u8>> = map.iter().map(|r| r.to_key()).collect();
    assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec(), b"d".to_vec(), b"e".to_vec()]);
}

#[test]
fn test_omap_range() {
    let mut txn = Omap::new().transaction();
    for key in ["a", "b", "c", "d", "e"].iter() {
        txn.set(Record::new(key.as_bytes(), Value::from(0), 1));
    }
    let map = txn.commit();

    let lo = Bound::Included(b"b".to_vec());
    let hi = Bound::Excluded(b"d".to_vec());
    let keys: Vec<Vec<u8>> = map.range((lo, hi)).map(|r| r.to_key()).collect();
    assert_eq!(keys, vec![b"b".to_vec(), b"c".to_vec()]);

    // empty window
    let lo = Bound::Included(b"b".to_vec());
    let hi = Bound::Excluded(b"b".to_vec());
    assert_eq!(map.range((lo, hi)).count(), 0);

    // unbounded low
    let hi = Bound::Excluded(b"c".to_vec());
    let keys: Vec<Vec<u8>> = map
        .range((Bound::<Vec<u8>>::Unbounded, hi))
        .map(|r| r.to_key())
        .collect();
    assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);

    // low between keys
    let lo = Bound::Included(b"bb".to_vec());
    let keys: Vec<Vec<u8>> = map
        .range((lo, Bound::<Vec<u8>>::Unbounded))
        .map(|r| r.to_key())
        .collect();
    assert_eq!(keys, vec![b"c".to_vec(), b"d".to_vec(), b"e".to_vec()]);
}

#[test]
fn test_omap_structural_sharing() {
    let mut txn = Omap::new().transaction();
    for i in 0..1024_u64 {
        let key = format!("key-{:08}", i).into_bytes();
        txn.set(Record::new(&key, Value::from(i as i64), 1));
    }
    let map1 = txn.commit();

    let mut txn = map1.transaction();
    txn.set(Record::new(b"key-00000000", Value::from(-1), 2));
    let map2 = txn.commit();

    // both snapshots remain fully readable with their own view.
    assert_eq!(map1.get(b"key-00000000").unwrap().last().value.to_numeric(), Some(0));
    assert_eq!(map2.get(b"key-00000000").unwrap().last().value.to_numeric(), Some(-1));
    assert_eq!(map1.len(), 1024);
    assert_eq!(map2.len(), 1024);
    map1.validate().unwrap();
    map2.validate().unwrap();
}

#[test]
fn test_omap_random_load() {
    let seed: u128 = random();
    println!("test_omap_random_load seed:{}", seed);
    let mut seed_bytes = [0u8; 32];
    seed_bytes[..16].copy_from_slice(&(seed).to_le_bytes());
    let mut rng = SmallRng::from_seed(seed_bytes);

    let mut map = Omap::new();
    let mut model: BTreeMap<Vec<u8>, i64> = BTreeMap::new();

    for _batch in 0..100 {
        let mut txn = map.transaction();
        for _op in 0..(rng.gen::<usize>() % 100) {
            let key = key_of(&mut rng, 1000);
            match rng.gen::<u8>() % 4 {
                0..=2 => {
                    let val = rng.gen::<i64>();
                    txn.set(Record::new(&key, Value::from(val), 1));
                    model.insert(key, val);
                }
                _ => {
                    let a = txn.delete(&key);
                    let b = model.remove(&key);
                    assert_eq!(a.is_some(), b.is_some());
                }
            }
        }
        map = txn.commit();

        assert_eq!(map.len(), model.len());
        map.validate().unwrap();
    }

    // final full comparison, in order.
    let items: Vec<(Vec<u8>, i64)> = map
        .iter()
        .map(|r| (r.to_key(), r.last().value.to_numeric().unwrap()))
        .collect();
    let model_items: Vec<(Vec<u8>, i64)> =
        model.iter().map(|(k, v)| (k.clone(), *v)).collect();
    assert_eq!(items, model_items);

    // random range windows.
    for _i in 0..100 {
        let (mut a, mut b) = (key_of(&mut rng, 1000), key_of(&mut rng, 1000));
        if a > b {
            std::mem::swap(&mut a, &mut b);
        }
        let got: Vec<Vec<u8>> = map
            .range((Bound::Included(a.clone()), Bound::Excluded(b.clone())))
            .map(|r| r.to_key())
            .collect();
        let want: Vec<Vec<u8>> = model.range(a..b).map(|(k, _)| k.clone()).collect();
        assert_eq!(got, want);
    }
}
