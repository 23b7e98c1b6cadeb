use rand::{prelude::random, rngs::SmallRng, Rng, SeedableRng};

use super::*;

#[test]
fn test_record_new() {
    let r = Record::new(b"k1", Value::from("v1".as_bytes()), 1);
    assert_eq!(r.as_key(), b"k1");
    assert_eq!(r.len(), 1);
    assert_eq!(r.to_rev(), 1);
    assert!(!r.is_numeric());
    assert_eq!(r.last().value, Value::Blob(b"v1".to_vec()));

    let r = Record::new(b"n1", Value::from(10), 3);
    assert!(r.is_numeric());
    assert_eq!(r.last().value.to_numeric(), Some(10));
    assert_eq!(r.to_revs(), vec![3]);
}

#[test]
fn test_record_append() {
    let r1 = Record::new(b"k1", Value::from("v1".as_bytes()), 1);
    let r2 = r1.append(Value::from("v2".as_bytes()), 2).unwrap();
    let r3 = r2.append(Value::from("v3".as_bytes()), 5).unwrap();

    // receiver untouched
    assert_eq!(r1.len(), 1);
    assert_eq!(r2.len(), 2);
    assert_eq!(r3.to_revs(), vec![1, 2, 5]);
    assert_eq!(r3.last().value.as_blob(), Some("v3".as_bytes()));

    // stale revision
    assert_eq!(
        r3.append(Value::from("v4".as_bytes()), 5).unwrap_err(),
        Error::InvalidInput(String::default(), String::default())
    );
    // kind mismatches
    assert_eq!(
        r3.append(Value::from(1), 6).unwrap_err().to_name(),
        "IncompatibleValue"
    );
    let n = Record::new(b"n1", Value::from(1), 1);
    assert_eq!(
        n.append(Value::from("x".as_bytes()), 2).unwrap_err().to_name(),
        "IncompatibleValue"
    );
}

#[test]
fn test_record_tombstone() {
    let r1 = Record::new(b"k1", Value::from("v1".as_bytes()), 1);
    let r2 = r1.append(Value::from("v2".as_bytes()), 2).unwrap();
    let r3 = r2.tombstone(Value::from("v3".as_bytes()), 3).unwrap();

    assert_eq!(r3.len(), 1);
    assert_eq!(r3.to_revs(), vec![3]);
    assert_eq!(r3.last().value.as_blob(), Some("v3".as_bytes()));
    assert_eq!(r2.len(), 2);

    let n = Record::new(b"n1", Value::from(1), 1);
    assert_eq!(
        n.tombstone(Value::from("x".as_bytes()), 2).unwrap_err().to_name(),
        "IncompatibleValue"
    );
}

#[test]
fn test_record_increment() {
    let n1 = Record::new(b"n1", Value::from(1), 1);
    let n2 = n1.increment(1, 2).unwrap();
    let n3 = n2.increment(3, 3).unwrap();

    assert_eq!(n3.len(), 1);
    assert_eq!(n3.last().value.to_numeric(), Some(5));
    assert_eq!(n3.to_rev(), 3);
    assert_eq!(n1.last().value.to_numeric(), Some(1));

    // overflow wraps, modulo 2^64
    let m1 = Record::new(b"m1", Value::from(i64::MAX), 1);
    let m2 = m1.increment(1, 2).unwrap();
    assert_eq!(m2.last().value.to_numeric(), Some(i64::MIN));
    let m3 = m2.increment(-1, 3).unwrap();
    assert_eq!(m3.last().value.to_numeric(), Some(i64::MAX));

    let r = Record::new(b"k1", Value::from("v1".as_bytes()), 1);
    assert_eq!(r.increment(1, 2).unwrap_err().to_name(), "IncompatibleValue");
}

#[test]
fn test_record_find() {
    let r = {
        let r = Record::new(b"k1", Value::from("a".as_bytes()), 2);
        let r = r.append(Value::from("b".as_bytes()), 4).unwrap();
        r.append(Value::from("c".as_bytes()), 9).unwrap()
    };

    // equal == true
    assert_eq!(r.find(2, true), Some(0));
    assert_eq!(r.find(4, true), Some(1));
    assert_eq!(r.find(9, true), Some(2));
    assert_eq!(r.find(1, true), None);
    assert_eq!(r.find(3, true), None);
    assert_eq!(r.find(10, true), None);

    // equal == false, smallest index with rev >= arg
    assert_eq!(r.find(1, false), Some(0));
    assert_eq!(r.find(2, false), Some(0));
    assert_eq!(r.find(3, false), Some(1));
    assert_eq!(r.find(5, false), Some(2));
    assert_eq!(r.find(9, false), Some(2));
    assert_eq!(r.find(10, false), None);
}

#[test]
fn test_record_views() {
    let r = {
        let r = Record::new(b"k1", Value::from("a".as_bytes()), 1);
        let r = r.append(Value::from("b".as_bytes()), 2).unwrap();
        r.append(Value::from("c".as_bytes()), 3).unwrap()
    };

    assert_eq!(r.at(0).unwrap().rev, 1);
    assert_eq!(r.at(2).unwrap().rev, 3);
    assert_eq!(r.at(3), None);
    assert_eq!(r.last().rev, 3);
    assert_eq!(r.from(1).len(), 2);
    assert_eq!(r.from(1)[0].rev, 2);
    assert_eq!(r.as_blocks().len(), 3);
}

#[test]
fn test_record_from_blocks() {
    let blocks = vec![
        Block::new(Value::from("a".as_bytes()), 1),
        Block::new(Value::from("b".as_bytes()), 2),
    ];
    let r = Record::from_blocks(b"k1", blocks).unwrap();
    assert_eq!(r.len(), 2);

    assert_eq!(
        Record::from_blocks(b"k1", vec![]).unwrap_err().to_name(),
        "DecodeFail"
    );
    let blocks = vec![
        Block::new(Value::from("a".as_bytes()), 1),
        Block::new(Value::from(1), 2),
    ];
    assert_eq!(
        Record::from_blocks(b"k1", blocks).unwrap_err().to_name(),
        "DecodeFail"
    );
    let blocks = vec![
        Block::new(Value::from("a".as_bytes()), 2),
        Block::new(Value::from("b".as_bytes()), 2),
    ];
    assert_eq!(
        Record::from_blocks(b"k1", blocks).unwrap_err().to_name(),
        "DecodeFail"
    );
}

#[test]
fn test_record_find_fuzz() {
    let seed: u128 = random();
    println!("test_record_find_fuzz seed:{}", seed);
    let mut seed_bytes = [0u8; 32];
    seed_bytes[..16].copy_from_slice(&(seed).to_le_bytes());
    let mut rng = SmallRng::from_seed(seed_bytes);

    for _i in 0..100 {
        let mut revs: Vec<u64> = vec![];
        let mut rev = 0_u64;
        for _ in 0..(rng.gen::<usize>() % 64) + 1 {
            rev += (rng.gen::<u64>() % 10) + 1;
            revs.push(rev);
        }
        let mut record = Record::new(b"key", Value::from("0".as_bytes()), revs[0]);
        for rev in revs[1..].iter() {
            record = record.append(Value::from("x".as_bytes()), *rev).unwrap();
        }

        for probe in 0..=(rev + 1) {
            let want_eq = revs.iter().position(|r| *r == probe);
            assert_eq!(record.find(probe, true), want_eq, "probe:{}", probe);
            let want_ge = revs.iter().position(|r| *r >= probe);
            assert_eq!(record.find(probe, false), want_ge, "probe:{}", probe);
        }
    }
}
