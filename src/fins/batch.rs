//! FINS batching planner (spec 4.6, "FINS plan"): contiguous word grouping,
//! multi-read consolidation, and individual bit reads.

use crate::addr::fins::{self, FinsAddress};

const MAX_GROUP_WORDS: u32 = 998;
const MAX_MULTI_READ_ENTRIES: usize = 64;
const PER_GROUP_THRESHOLD: usize = 3;

pub enum WordPlan {
    /// issue one `0x0101` per group (groups ≤ 3, or groups are not all
    /// single-word — 0x0104 cannot represent a multi-word group, so mixed
    /// group sizes always fall back to per-group reads regardless of
    /// count).
    Groups(Vec<Vec<usize>>),
    /// issue one `0x0104` multi-read per chunk of up to 64 single-word
    /// addresses (groups > 3, all single-word).
    MultiRead(Vec<Vec<usize>>),
}

pub struct Plan {
    pub word_plan: WordPlan,
    /// bit addresses, read individually (spec: "the core issues them
    /// per-tag").
    pub bit_indices: Vec<usize>,
}

/// builds a read plan from parsed addresses, indexed by their position in
/// the caller's original request list.
pub fn plan(addrs: &[FinsAddress]) -> Plan {
    let mut bit_indices = Vec::new();
    let mut word_indices: Vec<usize> = Vec::new();
    for (i, a) in addrs.iter().enumerate() {
        if a.is_bit {
            bit_indices.push(i);
        } else {
            word_indices.push(i);
        }
    }
    word_indices.sort_by_key(|&i| (addrs[i].memory_area, addrs[i].word_address));

    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    let mut current_area = 0u8;
    let mut current_words = 0u32;
    let mut expected_next = 0u16;

    for &i in &word_indices {
        let a = &addrs[i];
        let words = fins::word_span(a);
        let fits_current = !current.is_empty()
            && a.memory_area == current_area
            && a.word_address == expected_next
            && current_words + words <= MAX_GROUP_WORDS;
        if fits_current {
            current.push(i);
        } else {
            if !current.is_empty() {
                groups.push(std::mem::take(&mut current));
            }
            current.push(i);
            current_area = a.memory_area;
            current_words = 0;
        }
        current_words += words;
        expected_next = a.word_address.wrapping_add(words as u16);
    }
    if !current.is_empty() {
        groups.push(current);
    }

    let all_single_word = groups.iter().all(|g| g.len() == 1 && fins::word_span(&addrs[g[0]]) == 1);

    let word_plan = if groups.len() <= PER_GROUP_THRESHOLD || !all_single_word {
        WordPlan::Groups(groups)
    } else {
        let flat: Vec<usize> = groups.into_iter().map(|g| g[0]).collect();
        let chunks = flat.chunks(MAX_MULTI_READ_ENTRIES).map(|c| c.to_vec()).collect();
        WordPlan::MultiRead(chunks)
    };

    Plan { word_plan, bit_indices }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr::fins;

    fn dm(word: u16) -> FinsAddress {
        fins::parse(&format!("DM{}", word), None).unwrap()
    }

    #[test]
    fn contiguous_words_fold_into_one_group() {
        let addrs = vec![dm(0), dm(1), dm(2)];
        let p = plan(&addrs);
        match p.word_plan {
            WordPlan::Groups(groups) => {
                assert_eq!(groups.len(), 1);
                assert_eq!(groups[0], vec![0, 1, 2]);
            }
            WordPlan::MultiRead(_) => panic!("expected per-group plan"),
        }
    }

    #[test]
    fn three_scattered_groups_stay_per_group() {
        let addrs = vec![dm(0), dm(100), dm(200)];
        let p = plan(&addrs);
        match p.word_plan {
            WordPlan::Groups(groups) => assert_eq!(groups.len(), 3),
            WordPlan::MultiRead(_) => panic!("expected per-group plan for 3 groups"),
        }
    }

    #[test]
    fn ten_scattered_single_words_use_multi_read() {
        let addrs: Vec<_> = (0..10).map(|i| dm(i * 100)).collect();
        let p = plan(&addrs);
        match p.word_plan {
            WordPlan::MultiRead(chunks) => {
                assert_eq!(chunks.len(), 1);
                assert_eq!(chunks[0].len(), 10);
            }
            WordPlan::Groups(_) => panic!("expected multi-read plan"),
        }
    }

    #[test]
    fn bit_addresses_are_listed_individually() {
        let addrs = vec![fins::parse("CIO0.1", None).unwrap(), dm(0)];
        let p = plan(&addrs);
        assert_eq!(p.bit_indices, vec![0]);
    }
}
