//! キーワード単位の生成ロック
//!
//! 同じキーワードに対するパイプライン実行は常に1本。ロック獲得時に
//! キーワードを `generating` へ進め、ガードの Drop で
//! まだ `generating` のままなら `pending` へ戻す。成功・失敗で別の
//! 終端状態に進んでいれば何もしないため、どの経路で抜けても
//! キーワードが `generating` に取り残されることはない。

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use uuid::Uuid;

use crate::error::EngineError;
use crate::store::{KeywordStatus, MemoryStore};

/// 実行中キーワードの集合
#[derive(Debug, Default)]
pub struct KeywordLocks {
    held: Mutex<HashSet<Uuid>>,
}

impl KeywordLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// ロックを獲得し、キーワードを `generating` へ進める
    pub fn acquire(
        self: &Arc<Self>,
        keyword_id: Uuid,
        store: Arc<MemoryStore>,
    ) -> Result<KeywordLockGuard, EngineError> {
        {
            let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
            if !held.insert(keyword_id) {
                return Err(EngineError::AlreadyGenerating(keyword_id));
            }
        }
        store.update_keyword_status_if(
            keyword_id,
            KeywordStatus::Pending,
            KeywordStatus::Generating,
        );
        Ok(KeywordLockGuard {
            locks: Arc::clone(self),
            store,
            keyword_id,
        })
    }

    fn release(&self, keyword_id: Uuid) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        held.remove(&keyword_id);
    }
}

/// 獲得済みロックの RAII ガード
#[derive(Debug)]
pub struct KeywordLockGuard {
    locks: Arc<KeywordLocks>,
    store: Arc<MemoryStore>,
    keyword_id: Uuid,
}

impl Drop for KeywordLockGuard {
    fn drop(&mut self) {
        self.store.update_keyword_status_if(
            self.keyword_id,
            KeywordStatus::Generating,
            KeywordStatus::Pending,
        );
        self.locks.release(self.keyword_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SeoKeyword;

    fn setup() -> (Arc<KeywordLocks>, Arc<MemoryStore>, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let keyword = store.insert_keyword(SeoKeyword::new(Uuid::new_v4(), "comprar casa"));
        (Arc::new(KeywordLocks::new()), store, keyword.id)
    }

    #[test]
    fn test_second_acquire_is_rejected() {
        let (locks, store, keyword_id) = setup();
        let _guard = locks.acquire(keyword_id, store.clone()).unwrap();
        let err = locks.acquire(keyword_id, store).unwrap_err();
        assert!(matches!(err, EngineError::AlreadyGenerating(id) if id == keyword_id));
    }

    #[test]
    fn test_drop_restores_pending_and_frees_lock() {
        let (locks, store, keyword_id) = setup();
        {
            let _guard = locks.acquire(keyword_id, store.clone()).unwrap();
            assert_eq!(
                store.keyword(keyword_id).unwrap().status,
                KeywordStatus::Generating
            );
        }
        assert_eq!(
            store.keyword(keyword_id).unwrap().status,
            KeywordStatus::Pending
        );
        assert!(locks.acquire(keyword_id, store).is_ok());
    }

    #[test]
    fn test_drop_keeps_terminal_status() {
        let (locks, store, keyword_id) = setup();
        {
            let _guard = locks.acquire(keyword_id, store.clone()).unwrap();
            store.set_keyword_status(keyword_id, KeywordStatus::Used);
        }
        assert_eq!(
            store.keyword(keyword_id).unwrap().status,
            KeywordStatus::Used
        );
    }
}
