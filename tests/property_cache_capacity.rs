use flagcache::adapters::cache::BoundedCache;
use flagcache::domain::models::{CacheKey, EvaluationResult, Namespace, RemoteEvaluation};
use flagcache::domain::ports::CacheStore;
use proptest::prelude::*;
use serde_json::json;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Op {
    Set(u8),
    Get(u8),
    Delete(u8),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0u8..16).prop_map(Op::Set),
        2 => (0u8..16).prop_map(Op::Get),
        1 => (0u8..16).prop_map(Op::Delete),
    ]
}

fn key(k: u8) -> String {
    format!("flag:{k}:user:u:env:test")
}

fn value(k: u8) -> EvaluationResult {
    EvaluationResult::from_remote(key(k), RemoteEvaluation::value(json!(k)))
}

/// Reference LRU: front is least recently used
fn touch(model: &mut Vec<u8>, k: u8) {
    model.retain(|&m| m != k);
    model.push(k);
}

proptest! {
    /// Property: size never exceeds capacity, and overflow evicts the least
    /// recently touched entry
    #[test]
    fn prop_capacity_and_lru_order(
        capacity in 1usize..8,
        ops in prop::collection::vec(op(), 1..200)
    ) {
        let cache = BoundedCache::new(capacity, Duration::from_secs(3600));
        let mut model: Vec<u8> = Vec::new();

        for op in ops {
            match op {
                Op::Set(k) => {
                    cache.set(&key(k), value(k), Duration::ZERO);
                    touch(&mut model, k);
                    if model.len() > capacity {
                        model.remove(0);
                    }
                }
                Op::Get(k) => {
                    let hit = cache.get(&key(k));
                    prop_assert_eq!(hit.is_some(), model.contains(&k));
                    if let Some(result) = hit {
                        prop_assert_eq!(result.value, json!(k));
                        touch(&mut model, k);
                    }
                }
                Op::Delete(k) => {
                    let removed = cache.delete(&key(k));
                    prop_assert_eq!(removed, model.contains(&k));
                    model.retain(|&m| m != k);
                }
            }

            prop_assert!(cache.size() <= capacity);
            prop_assert_eq!(cache.size(), model.len());
        }

        let mut expected: Vec<String> = model.iter().map(|&k| key(k)).collect();
        let mut actual = cache.keys();
        expected.sort();
        actual.sort();
        prop_assert_eq!(actual, expected);
    }

    /// Property: identical inputs derive identical keys, and changing any
    /// single component changes the key
    #[test]
    fn prop_cache_key_determinism(
        entity in "[a-z:%]{1,8}",
        user in "[a-z0-9:%]{1,8}",
        env in "[a-z:]{1,6}",
        other in "[a-z0-9:%]{1,8}"
    ) {
        let key = CacheKey::derive(Namespace::Flag, &entity, &user, &env);
        prop_assert_eq!(&key, &CacheKey::derive(Namespace::Flag, &entity, &user, &env));
        prop_assert_ne!(&key, &CacheKey::derive(Namespace::Gate, &entity, &user, &env));

        if other != entity {
            prop_assert_ne!(&key, &CacheKey::derive(Namespace::Flag, &other, &user, &env));
        }
        if other != user {
            prop_assert_ne!(&key, &CacheKey::derive(Namespace::Flag, &entity, &other, &env));
        }
        if other != env {
            prop_assert_ne!(&key, &CacheKey::derive(Namespace::Flag, &entity, &user, &other));
        }
    }
}
