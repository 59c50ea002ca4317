use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::app::{PostwatchError, Result};
use crate::domain::Item;
use crate::store::Store;

#[derive(Debug)]
struct StoredPost {
    item: Item,
    seq: u64,
}

#[derive(Debug, Default)]
struct Tables {
    posts: HashMap<String, StoredPost>,
    by_author: HashMap<String, HashSet<String>>,
    next_seq: u64,
}

fn ranked<'a>(posts: impl Iterator<Item = &'a StoredPost>, count: usize) -> Vec<Item> {
    let mut posts: Vec<&StoredPost> = posts.collect();
    posts.sort_by(|a, b| {
        b.item
            .score()
            .cmp(&a.item.score())
            .then(a.seq.cmp(&b.seq))
    });
    posts
        .into_iter()
        .take(count)
        .map(|p| p.item.clone())
        .collect()
}

impl Tables {
    fn posts_by(&self, author: &str) -> impl Iterator<Item = &StoredPost> {
        self.by_author
            .get(author)
            .into_iter()
            .flatten()
            .filter_map(|id| self.posts.get(id))
    }
}

/// In-process store. Writes take an exclusive lock, queries share a read lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        Ok(self.tables.read()?)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        Ok(self.tables.write()?)
    }
}

impl Store for MemoryStore {
    fn insert(&self, item: Item) -> Result<()> {
        let mut tables = self.write()?;

        if tables.posts.contains_key(item.id()) {
            debug_assert!(false, "insert called for stored post {}", item.id());
            return Err(PostwatchError::DuplicatePost(item.id().to_string()));
        }

        let seq = tables.next_seq;
        tables.next_seq += 1;
        tables
            .by_author
            .entry(item.author().to_string())
            .or_default()
            .insert(item.id().to_string());
        tables
            .posts
            .insert(item.id().to_string(), StoredPost { item, seq });

        Ok(())
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let mut tables = self.write()?;

        let Some(removed) = tables.posts.remove(id) else {
            return Ok(false);
        };

        let author = removed.item.author();
        if let Some(ids) = tables.by_author.get_mut(author) {
            ids.remove(id);
            if ids.is_empty() {
                tables.by_author.remove(author);
            }
        }

        Ok(true)
    }

    fn clear(&self) -> Result<()> {
        let mut tables = self.write()?;
        tables.posts.clear();
        tables.by_author.clear();
        Ok(())
    }

    fn set_post_score(&self, id: &str, score: i64) -> Result<()> {
        let mut tables = self.write()?;
        if let Some(stored) = tables.posts.get_mut(id) {
            stored.item.set_score(score);
        }
        Ok(())
    }

    fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.read()?.posts.contains_key(id))
    }

    fn get_all_posts(&self) -> Result<Vec<Item>> {
        Ok(self
            .read()?
            .posts
            .values()
            .map(|p| p.item.clone())
            .collect())
    }

    fn get_all_posts_by_user(&self, author: &str) -> Result<Vec<Item>> {
        let tables = self.read()?;
        Ok(tables.posts_by(author).map(|p| p.item.clone()).collect())
    }

    fn get_top_posts(&self, count: usize) -> Result<Vec<Item>> {
        let tables = self.read()?;
        Ok(ranked(tables.posts.values(), count))
    }

    fn get_top_posts_by_user(&self, author: &str, count: usize) -> Result<Vec<Item>> {
        let tables = self.read()?;
        Ok(ranked(tables.posts_by(author), count))
    }

    fn get_post_counts_by_user(&self) -> Result<HashMap<String, usize>> {
        Ok(self
            .read()?
            .by_author
            .iter()
            .map(|(author, ids)| (author.clone(), ids.len()))
            .collect())
    }
}
