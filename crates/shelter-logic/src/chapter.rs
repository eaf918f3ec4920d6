//! Chapter progression.
//!
//! Chapters unlock strictly in number order. Chapter 1 starts in progress;
//! finishing a chapter-end quest completes the current chapter and moves on
//! to the next number, if there is one.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::parse::split_list;
use crate::tables::ChapterRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChapterStatus {
    Locked,
    Unlocked,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: String,
    pub name_key: String,
    pub number: u32,
    pub status: ChapterStatus,
    pub map_ids: Vec<String>,
    /// 1-based index into `map_ids`.
    pub current_map_index: usize,
}

impl Chapter {
    pub fn from_row(row: &ChapterRow) -> Self {
        Self {
            id: row.id.clone(),
            name_key: row.name_key.clone(),
            number: row.number,
            status: ChapterStatus::Locked,
            map_ids: split_list(&row.map_ids),
            current_map_index: 1,
        }
    }

    /// The map at the current index, or the first map if the index is stale.
    pub fn current_map_id(&self) -> Option<&str> {
        self.current_map_index
            .checked_sub(1)
            .and_then(|i| self.map_ids.get(i))
            .or_else(|| self.map_ids.first())
            .map(String::as_str)
    }
}

/// Save-game view of chapter progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterContext {
    pub current_chapter_id: Option<String>,
    pub current_map_index: usize,
    pub unlocked: BTreeSet<String>,
    pub completed: BTreeSet<String>,
}

impl Default for ChapterContext {
    fn default() -> Self {
        Self {
            current_chapter_id: None,
            current_map_index: 1,
            unlocked: BTreeSet::new(),
            completed: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterBook {
    chapters: BTreeMap<String, Chapter>,
    current: Option<String>,
}

impl ChapterBook {
    pub fn new(rows: &[ChapterRow]) -> Self {
        Self::with_context(rows, ChapterContext::default())
    }

    /// Rebuild statuses from a saved context. Chapter 1 is always unlocked;
    /// completed beats unlocked, unlocked beats locked.
    pub fn with_context(rows: &[ChapterRow], ctx: ChapterContext) -> Self {
        let chapters = rows
            .iter()
            .map(|row| (row.id.clone(), Chapter::from_row(row)))
            .collect();
        let mut book = Self {
            chapters,
            current: ctx.current_chapter_id.filter(|id| !id.is_empty()),
        };

        if let Some(first) = book.id_by_number(1) {
            book.set_status(&first, ChapterStatus::Unlocked);
            if book.current.is_none() {
                book.current = Some(first);
            }
        }
        for id in &ctx.unlocked {
            book.set_status(id, ChapterStatus::Unlocked);
        }
        if let Some(chapter) = book.current.clone().and_then(|id| book.chapters.get_mut(&id)) {
            chapter.status = chapter.status.max(ChapterStatus::InProgress);
            chapter.current_map_index = ctx.current_map_index.max(1);
        }
        for id in &ctx.completed {
            book.set_status(id, ChapterStatus::Completed);
        }
        book
    }

    /// Raise a chapter's status, never lowering it.
    fn set_status(&mut self, id: &str, status: ChapterStatus) {
        if let Some(chapter) = self.chapters.get_mut(id) {
            chapter.status = chapter.status.max(status);
        }
    }

    fn id_by_number(&self, number: u32) -> Option<String> {
        self.chapters
            .values()
            .find(|c| c.number == number)
            .map(|c| c.id.clone())
    }

    pub fn get(&self, id: &str) -> Option<&Chapter> {
        self.chapters.get(id)
    }

    pub fn current(&self) -> Option<&Chapter> {
        self.current.as_deref().and_then(|id| self.chapters.get(id))
    }

    pub fn current_map_id(&self) -> Option<&str> {
        self.current().and_then(Chapter::current_map_id)
    }

    /// Complete the current chapter and open the next by number.
    ///
    /// Returns the new current chapter, or `None` when the finished chapter
    /// was the last one (it stays current).
    pub fn unlock_next(&mut self) -> Option<&Chapter> {
        let current_id = self.current.clone()?;
        let number = {
            let chapter = self.chapters.get_mut(&current_id)?;
            chapter.status = ChapterStatus::Completed;
            chapter.number
        };

        let next_id = self.id_by_number(number.checked_add(1)?)?;
        let next = self.chapters.get_mut(&next_id)?;
        next.status = ChapterStatus::InProgress;
        next.current_map_index = 1;
        self.current = Some(next_id);
        self.current()
    }

    /// Point the current chapter at map `index` (1-based).
    pub fn switch_to_map(&mut self, index: usize) -> bool {
        let Some(chapter) = self.current.as_deref().and_then(|id| self.chapters.get_mut(id)) else {
            return false;
        };
        if index == 0 || index > chapter.map_ids.len() {
            return false;
        }
        chapter.current_map_index = index;
        true
    }

    /// Every chapter in number order.
    pub fn chapters(&self) -> Vec<&Chapter> {
        let mut all: Vec<&Chapter> = self.chapters.values().collect();
        all.sort_by_key(|c| c.number);
        all
    }

    pub fn unlocked_chapters(&self) -> Vec<&Chapter> {
        self.chapters()
            .into_iter()
            .filter(|c| c.status != ChapterStatus::Locked)
            .collect()
    }

    pub fn is_unlocked(&self, id: &str) -> bool {
        self.get(id).is_some_and(|c| c.status != ChapterStatus::Locked)
    }

    pub fn is_completed(&self, id: &str) -> bool {
        self.get(id).is_some_and(|c| c.status == ChapterStatus::Completed)
    }

    pub fn context(&self) -> ChapterContext {
        let ids_with = |pred: fn(&Chapter) -> bool| -> BTreeSet<String> {
            self.chapters
                .values()
                .filter(|c| pred(c))
                .map(|c| c.id.clone())
                .collect()
        };
        ChapterContext {
            current_chapter_id: self.current.clone(),
            current_map_index: self.current().map_or(1, |c| c.current_map_index),
            unlocked: ids_with(|c| c.status != ChapterStatus::Locked),
            completed: ids_with(|c| c.status == ChapterStatus::Completed),
        }
    }
}
