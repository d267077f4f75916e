//! 以强类型标识符访问的槽位容器。
//!
//! 与普通向量不同，元素可以被移除：被移除的槽位保留为空洞，标识符永不复用，
//! 因此外部持有的旧标识符只会查不到，而不会指向新的组件。
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// 可用作 [`Arena`] 下标的标识符类型。
pub trait Idx: Copy + Eq + Ord + std::hash::Hash + fmt::Debug {
    fn index(self) -> usize;
    fn from_usize(idx: usize) -> Self;
}

#[derive(Clone, PartialEq, Eq)]
pub struct Arena<I, T> {
    slots: Vec<Option<T>>,
    live: usize,
    _marker: PhantomData<I>,
}

impl<I, T> Arena<I, T>
where
    I: Idx,
{
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            live: 0,
            _marker: PhantomData,
        }
    }

    pub fn insert(&mut self, value: T) -> I {
        let idx = self.slots.len();
        self.slots.push(Some(value));
        self.live += 1;
        I::from_usize(idx)
    }

    pub fn remove(&mut self, id: I) -> Option<T> {
        let removed = self.slots.get_mut(id.index()).and_then(Option::take);
        if removed.is_some() {
            self.live -= 1;
        }
        removed
    }

    pub fn contains(&self, id: I) -> bool {
        self.get(id).is_some()
    }

    /// 存活元素个数。
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn get(&self, id: I) -> Option<&T> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: I) -> Option<&mut T> {
        self.slots.get_mut(id.index()).and_then(Option::as_mut)
    }

    pub fn ids(&self) -> impl Iterator<Item = I> + '_ {
        self.iter_enumerated().map(|(id, _)| id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().flatten()
    }

    pub fn iter_enumerated(&self) -> impl Iterator<Item = (I, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_ref().map(|value| (I::from_usize(idx), value)))
    }

    pub fn iter_enumerated_mut(&mut self) -> impl Iterator<Item = (I, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_mut().map(|value| (I::from_usize(idx), value)))
    }

    /// 移除所有未通过 `keep` 的元素，返回被移除的标识符。
    pub fn retain<F>(&mut self, mut keep: F) -> Vec<I>
    where
        F: FnMut(I, &T) -> bool,
    {
        let mut removed = Vec::new();
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            let id = I::from_usize(idx);
            if slot.as_ref().is_some_and(|value| !keep(id, value)) {
                *slot = None;
                removed.push(id);
            }
        }
        self.live -= removed.len();
        removed
    }
}

impl<I, T> Default for Arena<I, T>
where
    I: Idx,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<I, T> fmt::Debug for Arena<I, T>
where
    I: Idx,
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter_enumerated()).finish()
    }
}

impl<I, T> Index<I> for Arena<I, T>
where
    I: Idx,
{
    type Output = T;

    fn index(&self, index: I) -> &Self::Output {
        match self.get(index) {
            Some(value) => value,
            None => panic!("arena slot {index:?} is vacant"),
        }
    }
}

impl<I, T> IndexMut<I> for Arena<I, T>
where
    I: Idx,
{
    fn index_mut(&mut self, index: I) -> &mut Self::Output {
        match self.get_mut(index) {
            Some(value) => value,
            None => panic!("arena slot {index:?} is vacant"),
        }
    }
}
