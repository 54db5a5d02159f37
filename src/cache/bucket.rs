//! 哈希索引
//!
//! 每个哈希桶是一条双向链表，链接保存在槽位元数据的 `prev`/`next` 中，
//! 存放的是缓冲池数组下标而不是指针。桶锁保护表头和成员的链接字段。
//!
//! 本模块的函数都要求调用方已经持有对应的桶锁（即拿到了 `&BucketList`
//! 或 `&mut BucketList`），并且不持有被访问槽位的元数据锁，
//! 例外是 `push_front`/`remove` 的 `meta` 参数：那是调用方已经锁住的目标槽位。

use super::buffer::{Buffer, BufferMeta};
use crate::types::{BlockKey, SlotIndex};
use parking_lot::Mutex;

/// 单个哈希桶链表
#[derive(Debug, Default)]
pub(crate) struct BucketList {
    /// 表头
    head: Option<SlotIndex>,
    /// 成员数量
    len: usize,
}

impl BucketList {
    /// 查找持有 `key` 的槽位，找到后对其元数据执行 `f`
    ///
    /// `f` 在元数据锁内执行，命中路径用它增加引用计数。
    pub fn find_map<R>(
        &self,
        slots: &[Buffer],
        key: &BlockKey,
        f: impl FnOnce(&mut BufferMeta) -> R,
    ) -> Option<(SlotIndex, R)> {
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            let mut meta = slots[idx].meta.lock();
            if meta.holds(key) {
                return Some((idx, f(&mut meta)));
            }
            cursor = meta.next;
        }
        None
    }

    /// 把已锁定的槽位插到表头
    pub fn push_front(&mut self, slots: &[Buffer], idx: SlotIndex, meta: &mut BufferMeta) {
        debug_assert!(meta.prev.is_none() && meta.next.is_none());
        debug_assert_ne!(self.head, Some(idx));

        if let Some(head) = self.head {
            slots[head].meta.lock().prev = Some(idx);
        }
        meta.prev = None;
        meta.next = self.head;
        self.head = Some(idx);
        self.len += 1;
    }

    /// 从链表中摘除已锁定的槽位
    pub fn remove(&mut self, slots: &[Buffer], idx: SlotIndex, meta: &mut BufferMeta) {
        match meta.prev {
            Some(prev) => slots[prev].meta.lock().next = meta.next,
            None => {
                assert_eq!(self.head, Some(idx), "bcache: remove failed, slot not in bucket");
                self.head = meta.next;
            }
        }
        if let Some(next) = meta.next {
            slots[next].meta.lock().prev = meta.prev;
        }
        meta.prev = None;
        meta.next = None;
        self.len -= 1;
    }

    /// 成员数量
    pub fn len(&self) -> usize {
        self.len
    }

    /// 按链表顺序列出成员
    #[cfg(test)]
    pub fn members(&self, slots: &[Buffer]) -> Vec<SlotIndex> {
        let mut out = Vec::with_capacity(self.len);
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            out.push(idx);
            cursor = slots[idx].meta.lock().next;
        }
        out
    }
}

/// 哈希桶：一把桶锁加一条链表
#[derive(Debug, Default)]
pub(crate) struct Bucket {
    pub list: Mutex<BucketList>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(n: usize) -> Vec<Buffer> {
        (0..n).map(|_| Buffer::new(16)).collect()
    }

    fn assign(slots: &[Buffer], list: &mut BucketList, idx: SlotIndex, key: BlockKey) {
        let mut meta = slots[idx].meta.lock();
        meta.key = Some(key);
        list.push_front(slots, idx, &mut meta);
    }

    fn unlink(slots: &[Buffer], list: &mut BucketList, idx: SlotIndex) {
        let mut meta = slots[idx].meta.lock();
        list.remove(slots, idx, &mut meta);
    }

    #[test]
    fn test_push_front_order() {
        let slots = pool(4);
        let mut list = BucketList::default();
        assign(&slots, &mut list, 0, BlockKey::new(1, 0));
        assign(&slots, &mut list, 2, BlockKey::new(1, 13));
        assign(&slots, &mut list, 3, BlockKey::new(1, 26));

        assert_eq!(list.len(), 3);
        assert_eq!(list.members(&slots), vec![3, 2, 0]);
        assert_eq!(slots[3].meta.lock().prev, None);
        assert_eq!(slots[0].meta.lock().prev, Some(2));
    }

    #[test]
    fn test_remove_head_middle_tail() {
        let slots = pool(4);
        let mut list = BucketList::default();
        for i in 0..4 {
            assign(&slots, &mut list, i, BlockKey::new(1, i as u64));
        }
        assert_eq!(list.members(&slots), vec![3, 2, 1, 0]);

        unlink(&slots, &mut list, 2);
        assert_eq!(list.members(&slots), vec![3, 1, 0]);

        unlink(&slots, &mut list, 3);
        assert_eq!(list.members(&slots), vec![1, 0]);
        assert_eq!(slots[1].meta.lock().prev, None);

        unlink(&slots, &mut list, 0);
        assert_eq!(list.members(&slots), vec![1]);
        assert_eq!(slots[1].meta.lock().next, None);

        unlink(&slots, &mut list, 1);
        assert_eq!(list.len(), 0);
        assert!(list.members(&slots).is_empty());
    }

    #[test]
    fn test_find_map() {
        let slots = pool(3);
        let mut list = BucketList::default();
        assign(&slots, &mut list, 0, BlockKey::new(1, 5));
        assign(&slots, &mut list, 1, BlockKey::new(2, 5));

        let hit = list.find_map(&slots, &BlockKey::new(2, 5), |meta| {
            meta.get();
            meta.ref_count
        });
        assert_eq!(hit, Some((1, 1)));
        assert_eq!(slots[1].meta.lock().ref_count, 1);

        assert!(list.find_map(&slots, &BlockKey::new(3, 5), |_| ()).is_none());
    }

    #[test]
    #[should_panic(expected = "remove failed")]
    fn test_remove_foreign_slot_panics() {
        let slots = pool(2);
        let mut list = BucketList::default();
        assign(&slots, &mut list, 0, BlockKey::new(1, 0));
        // 槽位 1 从未入链
        unlink(&slots, &mut list, 1);
    }
}
