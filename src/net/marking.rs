//! 标识存储：每个库所、每种令牌颜色的令牌数。
//!
//! 计数类型为无符号整数，因此 `count(p, t) ≥ 0` 由类型保证；所有可能下溢的
//! 更新都在暂存阶段以 `checked_*` 运算拒绝。
use std::fmt;

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::net::ids::{PlaceId, TokenId};
use crate::net::structure::Weight;

/// 每个库所的令牌计数，按 [`TokenId`] 排序。
pub type TokenRow = SmallVec<[(TokenId, Weight); 4]>;

#[derive(Clone, Default, PartialEq, Eq)]
pub struct Marking {
    rows: IndexMap<PlaceId, TokenRow>,
}

impl Marking {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert_place(&mut self, place: PlaceId) {
        self.rows.entry(place).or_default();
    }

    pub(crate) fn remove_place(&mut self, place: PlaceId) {
        self.rows.shift_remove(&place);
    }

    pub(crate) fn remove_token(&mut self, token: TokenId) {
        for row in self.rows.values_mut() {
            row.retain(|(id, _)| *id != token);
        }
    }

    pub fn contains_place(&self, place: PlaceId) -> bool {
        self.rows.contains_key(&place)
    }

    /// `place` 中 `token` 的数量，缺失读作 0。
    pub fn count(&self, place: PlaceId, token: TokenId) -> Weight {
        self.rows
            .get(&place)
            .and_then(|row| {
                row.binary_search_by_key(&token, |(id, _)| *id)
                    .ok()
                    .map(|pos| row[pos].1)
            })
            .unwrap_or(0)
    }

    /// `place` 中所有颜色令牌的总数。
    pub fn total(&self, place: PlaceId) -> Weight {
        self.rows
            .get(&place)
            .map(|row| row.iter().map(|(_, count)| *count).sum())
            .unwrap_or(0)
    }

    pub fn row(&self, place: PlaceId) -> Option<&TokenRow> {
        self.rows.get(&place)
    }

    pub(crate) fn set(&mut self, place: PlaceId, token: TokenId, count: Weight) {
        let row = self.rows.entry(place).or_default();
        match row.binary_search_by_key(&token, |(id, _)| *id) {
            Ok(pos) => row[pos].1 = count,
            Err(pos) => row.insert(pos, (token, count)),
        }
    }

    pub fn places(&self) -> impl Iterator<Item = PlaceId> + '_ {
        self.rows.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PlaceId, TokenId, Weight)> + '_ {
        self.rows
            .iter()
            .flat_map(|(place, row)| row.iter().map(move |(token, count)| (*place, *token, *count)))
    }
}

impl fmt::Debug for Marking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (place, row) in self.rows.iter() {
            map.entry(place, row);
        }
        map.finish()
    }
}

/// 一次暂存的 `(place, token)` 更新：发射前读到的数量与待提交的数量。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenChange {
    pub place: PlaceId,
    pub token: TokenId,
    pub before: Weight,
    pub after: Weight,
}

/// 发射的暂存区：计算阶段只写入这里，提交阶段一次性写回 [`Marking`]。
#[derive(Debug, Default)]
pub(crate) struct StagedMarking {
    entries: IndexMap<(PlaceId, TokenId), TokenChange>,
}

impl StagedMarking {
    /// `(place, token)` 当前的暂存值，未暂存时读标识存储。
    pub(crate) fn current(&self, marking: &Marking, place: PlaceId, token: TokenId) -> Weight {
        self.entries
            .get(&(place, token))
            .map(|change| change.after)
            .unwrap_or_else(|| marking.count(place, token))
    }

    pub(crate) fn stage(&mut self, marking: &Marking, place: PlaceId, token: TokenId, after: Weight) {
        self.entries
            .entry((place, token))
            .and_modify(|change| change.after = after)
            .or_insert_with(|| TokenChange {
                place,
                token,
                before: marking.count(place, token),
                after,
            });
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 将暂存计数写入 `marking`，返回实际应用的变化。
    pub(crate) fn commit(self, marking: &mut Marking) -> Vec<TokenChange> {
        let changes = self.entries.into_values().collect::<Vec<_>>();
        for change in &changes {
            marking.set(change.place, change.token, change.after);
        }
        changes
    }
}

/// 将已提交的变化恢复到 `before` 一侧。
pub(crate) fn rollback(marking: &mut Marking, changes: &[TokenChange]) {
    for change in changes.iter().rev() {
        marking.set(change.place, change.token, change.before);
    }
}
