// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//!
//! Partitions of an integer set with generational refinement
//!
//! We consider a set of N integers [0 ... n-1].
//! A partition is a division of the set into K disjoint, non-empty sets.
//!
//! Refinement proceeds in generations: elements are marked one by one, then
//! every set that contains marked elements is split into its marked part
//! and its unmarked part.
//!

use std::fmt::Display;

// Implementation:
// - each set is identified by an integer between 0 and K-1 (the set index)
// - each set is also a slice in the elements array
// - elements[0 ... n-1]: is a permutation of the n integers
// - position[x] = index of x in elements
// - set_of[x] = index of the set that contains x
// - sets[j] = (start, size, marked) such that set j is elements[start .. start + size]
//   and the marked elements of set j are elements[start .. start + marked]
//
// There is no empty set: if n > 0, set 0 initially contains everything.
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SetDescriptor {
    start: u32,
    size: u32,
    marked: u32,
}

impl SetDescriptor {
    fn first_unmarked(&self) -> u32 {
        self.start + self.marked
    }

    fn end(&self) -> u32 {
        self.start + self.size
    }
}

///
/// A partition divides a set of integers [0 ... N-1]
/// into disjoint, non-empty sets.
///
/// Elements are marked with [mark](Self::mark). Then [refine_generation](Self::refine_generation)
/// splits every set that has both marked and unmarked elements. The smaller of
/// the two halves becomes a new set. This is what gives Hopcroft-style
/// algorithms their O(n log n) bound.
///
#[derive(Debug, Clone, Default)]
pub struct Partition {
    sets: Vec<SetDescriptor>,
    elements: Box<[u32]>,
    position: Box<[u32]>,
    set_of: Box<[u32]>,
    // sets with at least one marked element, each listed once
    touched: Vec<u32>,
}

impl Partition {
    ///
    /// Create a new partition for n elements
    /// - if n == 0, the partition has no sets
    /// - if n > 0, the partition has one set (index 0) that contains all elements
    ///
    pub fn new(n: u32) -> Self {
        if n == 0 {
            return Partition::default();
        }
        let size = n as usize;
        let elements: Box<[u32]> = (0..n).collect();
        let position = elements.clone();
        let set_of = vec![0; size].into_boxed_slice();
        Partition {
            sets: vec![SetDescriptor {
                start: 0,
                size: n,
                marked: 0,
            }],
            elements,
            position,
            set_of,
            touched: Vec::new(),
        }
    }

    ///
    /// Number of sets
    ///
    pub fn num_sets(&self) -> u32 {
        self.sets.len() as u32
    }

    ///
    /// Number of elements (not the number of sets, see [num_sets](Self::num_sets))
    ///
    pub fn num_elements(&self) -> u32 {
        self.elements.len() as u32
    }

    ///
    /// Index of the set that contains x
    ///
    pub fn set_index(&self, x: u32) -> u32 {
        self.set_of[x as usize]
    }

    ///
    /// First element of set i
    ///
    pub fn first_element(&self, i: u32) -> u32 {
        self.elements[self.sets[i as usize].start as usize]
    }

    ///
    /// Iterator to get all elements of set i
    ///
    pub fn set_elements(&self, i: u32) -> impl Iterator<Item = u32> + '_ {
        let d = self.sets[i as usize];
        self.elements[d.start as usize..d.end() as usize].iter().copied()
    }

    ///
    /// Mark element x in the current generation
    /// - x is moved to the marked prefix of its set
    /// - marking an element that is already marked does nothing
    ///
    pub fn mark(&mut self, x: u32) {
        let set_index = self.set_of[x as usize];
        let d = &mut self.sets[set_index as usize];
        let pos = self.position[x as usize];
        debug_assert!(d.start <= pos && pos < d.end());

        let first_unmarked = d.first_unmarked();
        if pos < first_unmarked {
            return;
        }

        // swap x with the first unmarked element
        let y = self.elements[first_unmarked as usize];
        self.elements[first_unmarked as usize] = x;
        self.elements[pos as usize] = y;
        self.position[x as usize] = first_unmarked;
        self.position[y as usize] = pos;

        if d.marked == 0 {
            debug_assert!(!self.touched.contains(&set_index));
            self.touched.push(set_index);
        }
        d.marked += 1;
    }

    ///
    /// Refine all the sets that have marked elements
    /// - if all elements of a set are marked, the set is unchanged
    /// - otherwise the set is split in two: the smallest half becomes a new set
    ///   and the other half keeps the original index. If the two halves have
    ///   the same size, the marked half becomes the new set.
    /// - f is called with the index of every new set
    ///
    /// All marks are cleared. The callback receives a shared reference to the
    /// partition, so it cannot modify it.
    ///
    pub fn refine_generation<F>(&mut self, mut f: F)
    where
        F: FnMut(&Self, u32),
    {
        let mut touched = std::mem::take(&mut self.touched);
        for &set_index in &touched {
            let d = &mut self.sets[set_index as usize];
            if d.marked == d.size {
                d.marked = 0;
                continue;
            }

            let new_set = if d.marked * 2 <= d.size {
                // the marked half is the smallest
                let new_set = SetDescriptor {
                    start: d.start,
                    size: d.marked,
                    marked: 0,
                };
                d.start += d.marked;
                new_set
            } else {
                SetDescriptor {
                    start: d.first_unmarked(),
                    size: d.size - d.marked,
                    marked: 0,
                }
            };
            d.size -= new_set.size;
            d.marked = 0;

            let new_index = self.num_sets();
            self.sets.push(new_set);
            for &x in &self.elements[new_set.start as usize..new_set.end() as usize] {
                self.set_of[x as usize] = new_index;
            }

            f(&*self, new_index);
        }
        touched.clear();
        self.touched = touched;
    }
}

impl Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for i in 0..self.num_sets() {
            write!(f, "set[{i}]: ")?;
            for x in self.set_elements(i) {
                write!(f, " {x}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
