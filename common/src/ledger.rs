//! 解析履歴（レジャー）
//!
//! 完了した解析を挿入順に保持し、ストアへ即時保存する。
//! 選択状態は画面上の一時状態なので保存しない。
//!
//! 不変条件: `selected` のインデックスは常に `entries` の範囲内。

use crate::error::{Error, Result};
use crate::export::csv_core::generate_csv_buffer;
use crate::store::KeyValueStore;
use crate::types::LedgerEntry;
use std::collections::BTreeSet;

/// ストア上のキー
pub const LEDGER_KEY: &str = "analysis-ledger";

/// 読み込み結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    /// 保存データなし
    Fresh,
    /// 読み込み成功（件数）
    Restored(usize),
    /// 保存データが壊れていたため空で開始
    Corrupt(String),
}

/// 解析履歴
#[derive(Debug)]
pub struct AnalysisLedger<S: KeyValueStore> {
    store: S,
    entries: Vec<LedgerEntry>,
    selected: BTreeSet<usize>,
}

impl<S: KeyValueStore> AnalysisLedger<S> {
    /// ストアから読み込み（失敗しても空の履歴を返す）
    pub fn load(store: S) -> Self {
        Self::load_with_status(store).0
    }

    /// ストアから読み込み、読み込み結果も返す
    pub fn load_with_status(store: S) -> (Self, LoadStatus) {
        let (entries, status) = match store.load(LEDGER_KEY) {
            Ok(None) => (Vec::new(), LoadStatus::Fresh),
            Ok(Some(bytes)) => match serde_json::from_slice::<Vec<LedgerEntry>>(&bytes) {
                Ok(entries) => {
                    let count = entries.len();
                    (entries, LoadStatus::Restored(count))
                }
                Err(e) => (Vec::new(), LoadStatus::Corrupt(e.to_string())),
            },
            Err(e) => (Vec::new(), LoadStatus::Corrupt(e.to_string())),
        };

        let ledger = Self {
            store,
            entries,
            selected: BTreeSet::new(),
        };
        (ledger, status)
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&LedgerEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// 末尾に追加して保存
    ///
    /// 保存に失敗してもエントリはメモリ上に残る（エラーは呼び出し元へ返す）。
    pub fn append(&mut self, entry: LedgerEntry) -> Result<usize> {
        self.entries.push(entry);
        let index = self.entries.len() - 1;
        self.persist()?;
        Ok(index)
    }

    /// 1件削除し、選択インデックスを詰め直す
    pub fn remove(&mut self, index: usize) -> Result<LedgerEntry> {
        if index >= self.entries.len() {
            return Err(Error::EntryNotFound(index));
        }

        let removed = self.entries.remove(index);
        self.selected = self
            .selected
            .iter()
            .filter(|&&i| i != index)
            .map(|&i| if i > index { i - 1 } else { i })
            .collect();

        self.persist()?;
        Ok(removed)
    }

    /// 全件削除（選択も同時にクリア）
    pub fn clear(&mut self) -> Result<()> {
        self.entries.clear();
        self.selected.clear();
        self.persist()
    }

    /// 選択状態を反転し、反転後の状態を返す
    pub fn toggle_select(&mut self, index: usize) -> Result<bool> {
        if index >= self.entries.len() {
            return Err(Error::EntryNotFound(index));
        }
        if self.selected.remove(&index) {
            Ok(false)
        } else {
            self.selected.insert(index);
            Ok(true)
        }
    }

    pub fn select_all(&mut self, flag: bool) {
        if flag {
            self.selected = (0..self.entries.len()).collect();
        } else {
            self.selected.clear();
        }
    }

    pub fn is_selected(&self, index: usize) -> bool {
        self.selected.contains(&index)
    }

    /// 全件選択されているか（空の履歴ではfalse）
    pub fn all_selected(&self) -> bool {
        !self.entries.is_empty() && self.selected.len() == self.entries.len()
    }

    /// 選択中のインデックス（昇順）
    pub fn selected_indices(&self) -> Vec<usize> {
        self.selected.iter().copied().collect()
    }

    /// 選択中のエントリ（履歴順）
    pub fn selected_entries(&self) -> Vec<&LedgerEntry> {
        self.selected
            .iter()
            .filter_map(|&i| self.entries.get(i))
            .collect()
    }

    /// 選択中のエントリをCSVで出力
    pub fn export_selected(&self) -> Result<Vec<u8>> {
        let rows = self.selected_entries();
        if rows.is_empty() {
            return Err(Error::EmptySelection);
        }
        generate_csv_buffer(rows)
    }

    /// 選択中のエントリをExcelで出力
    #[cfg(feature = "excel")]
    pub fn export_selected_excel(&self) -> Result<Vec<u8>> {
        let rows = self.selected_entries();
        if rows.is_empty() {
            return Err(Error::EmptySelection);
        }
        crate::export::excel_core::generate_excel_buffer(rows).map_err(Error::Export)
    }

    fn persist(&self) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&self.entries)?;
        self.store.save(LEDGER_KEY, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use proptest::prelude::*;

    fn entry(name: &str) -> LedgerEntry {
        LedgerEntry {
            sample_name: name.to_string(),
            date_iso: "2026-01-18".to_string(),
            time_iso: "12:00:00".to_string(),
            ..Default::default()
        }
    }

    fn ledger_with(names: &[&str]) -> AnalysisLedger<MemoryStore> {
        let mut ledger = AnalysisLedger::load(MemoryStore::new());
        for name in names {
            ledger.append(entry(name)).unwrap();
        }
        ledger
    }

    #[test]
    fn test_load_fresh() {
        let (ledger, status) = AnalysisLedger::load_with_status(MemoryStore::new());
        assert!(ledger.is_empty());
        assert_eq!(status, LoadStatus::Fresh);
    }

    #[test]
    fn test_append_persists_immediately() {
        let store = MemoryStore::new();
        let mut ledger = AnalysisLedger::load(store.clone());
        assert_eq!(ledger.append(entry("S1")).unwrap(), 0);
        assert_eq!(ledger.append(entry("S2")).unwrap(), 1);

        // 別インスタンスで読み直しても残っている
        let (reloaded, status) = AnalysisLedger::load_with_status(store);
        assert_eq!(status, LoadStatus::Restored(2));
        assert_eq!(reloaded.entries()[0].sample_name, "S1");
        assert_eq!(reloaded.entries()[1].sample_name, "S2");
    }

    #[test]
    fn test_corrupt_store_starts_empty() {
        let store = MemoryStore::new();
        store.put_raw(LEDGER_KEY, b"{ invalid json }");
        let (ledger, status) = AnalysisLedger::load_with_status(store);
        assert!(ledger.is_empty());
        assert!(matches!(status, LoadStatus::Corrupt(_)));
    }

    #[test]
    fn test_wrong_shape_starts_empty() {
        let store = MemoryStore::new();
        store.put_raw(LEDGER_KEY, br#"{"sampleName": "not a list"}"#);
        let (ledger, status) = AnalysisLedger::load_with_status(store);
        assert!(ledger.is_empty());
        assert!(matches!(status, LoadStatus::Corrupt(_)));
    }

    #[test]
    fn test_remove_shifts_selection() {
        let mut ledger = ledger_with(&["A", "B", "C", "D"]);
        ledger.toggle_select(0).unwrap();
        ledger.toggle_select(1).unwrap();
        ledger.toggle_select(3).unwrap();

        let removed = ledger.remove(1).unwrap();
        assert_eq!(removed.sample_name, "B");
        assert_eq!(ledger.selected_indices(), vec![0, 2]);

        let names: Vec<&str> = ledger.selected_entries().iter().map(|e| e.sample_name.as_str()).collect();
        assert_eq!(names, vec!["A", "D"]);
    }

    #[test]
    fn test_remove_out_of_range() {
        let mut ledger = ledger_with(&["A"]);
        assert!(matches!(ledger.remove(5), Err(Error::EntryNotFound(5))));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_remove_last_selected_keeps_invariant() {
        let mut ledger = ledger_with(&["A", "B"]);
        ledger.select_all(true);
        ledger.remove(1).unwrap();
        assert_eq!(ledger.selected_indices(), vec![0]);
        assert!(ledger.all_selected());
    }

    #[test]
    fn test_toggle_select() {
        let mut ledger = ledger_with(&["A", "B"]);
        assert!(ledger.toggle_select(1).unwrap());
        assert!(ledger.is_selected(1));
        assert!(!ledger.toggle_select(1).unwrap());
        assert!(!ledger.is_selected(1));
        assert!(matches!(ledger.toggle_select(2), Err(Error::EntryNotFound(2))));
    }

    #[test]
    fn test_select_all_and_clear() {
        let store = MemoryStore::new();
        let mut ledger = AnalysisLedger::load(store.clone());
        ledger.append(entry("A")).unwrap();
        ledger.append(entry("B")).unwrap();

        ledger.select_all(true);
        assert!(ledger.all_selected());
        ledger.select_all(false);
        assert!(ledger.selected_indices().is_empty());

        ledger.select_all(true);
        ledger.clear().unwrap();
        assert!(ledger.is_empty());
        assert!(ledger.selected_indices().is_empty());
        assert!(!ledger.all_selected());
        assert!(AnalysisLedger::load(store).is_empty());
    }

    #[test]
    fn test_selection_is_not_persisted() {
        let store = MemoryStore::new();
        let mut ledger = AnalysisLedger::load(store.clone());
        ledger.append(entry("A")).unwrap();
        ledger.toggle_select(0).unwrap();

        let reloaded = AnalysisLedger::load(store);
        assert!(!reloaded.is_selected(0));
    }

    #[test]
    fn test_export_empty_selection() {
        let ledger = ledger_with(&["A", "B"]);
        assert!(matches!(ledger.export_selected(), Err(Error::EmptySelection)));
    }

    #[test]
    fn test_export_selected_in_ledger_order() {
        let mut ledger = ledger_with(&["A", "B", "C"]);
        ledger.toggle_select(2).unwrap();
        ledger.toggle_select(0).unwrap();

        let text = String::from_utf8(ledger.export_selected().unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("A,"));
        assert!(lines[2].starts_with("C,"));
    }

    #[test]
    fn test_export_never_references_removed_entry() {
        let mut ledger = ledger_with(&["A", "B", "C"]);
        ledger.select_all(true);
        ledger.remove(1).unwrap();

        let text = String::from_utf8(ledger.export_selected().unwrap()).unwrap();
        assert!(!text.lines().any(|l| l.starts_with("B,")));
        assert_eq!(text.lines().count(), 3);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Append,
        Remove(usize),
        Toggle(usize),
        SelectAll(bool),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Append),
            any::<usize>().prop_map(Op::Remove),
            any::<usize>().prop_map(Op::Toggle),
            any::<bool>().prop_map(Op::SelectAll),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        /// append/remove/toggleを任意順で繰り返しても選択は範囲内で、削除済みは出力されない
        #[test]
        fn prop_selection_stays_in_range(ops in proptest::collection::vec(op_strategy(), 0..64)) {
            let mut ledger = ledger_with(&[]);
            let mut appended = 0usize;

            for op in ops {
                let len = ledger.len();
                match op {
                    Op::Append => {
                        ledger.append(entry(&format!("S{}", appended))).unwrap();
                        appended += 1;
                    }
                    Op::Remove(i) if len > 0 => {
                        let removed = ledger.remove(i % len).unwrap();
                        if let Ok(bytes) = ledger.export_selected() {
                            let text = String::from_utf8(bytes).unwrap();
                            let prefix = format!("{},", removed.sample_name);
                            prop_assert!(!text.lines().any(|l| l.starts_with(&prefix)));
                        }
                    }
                    Op::Toggle(i) if len > 0 => {
                        ledger.toggle_select(i % len).unwrap();
                    }
                    Op::Remove(i) => prop_assert!(ledger.remove(i).is_err()),
                    Op::Toggle(i) => prop_assert!(ledger.toggle_select(i).is_err()),
                    Op::SelectAll(flag) => ledger.select_all(flag),
                }
                prop_assert!(ledger.selected_indices().iter().all(|&i| i < ledger.len()));
                prop_assert_eq!(ledger.selected_entries().len(), ledger.selected_indices().len());
            }
        }
    }

    #[cfg(feature = "excel")]
    #[test]
    fn test_export_excel_empty_selection() {
        let ledger = ledger_with(&["A"]);
        assert!(matches!(ledger.export_selected_excel(), Err(Error::EmptySelection)));
    }
}
