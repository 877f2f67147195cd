use super::types::Link;
use crate::error::{Result, RouterError};

/// Outcome of looking for a slot to hold a link to a simulated address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSearchResult {
    /// Lowest free slot
    Found(usize),
    Full,
    /// The address is already attached at this slot
    Duplicate(usize),
}

/// Fixed-size table of links; a free slot holds `None`.
#[derive(Debug, Clone)]
pub struct PortTable {
    slots: Vec<Option<Link>>,
}

impl PortTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Duplicate attachment wins over a full table.
    pub fn search(&self, simulated_ip: &str) -> PortSearchResult {
        let mut free = None;
        for (index, slot) in self.slots.iter().enumerate() {
            match slot {
                Some(link) if link.remote.simulated_ip == simulated_ip => {
                    return PortSearchResult::Duplicate(index);
                }
                Some(_) => {}
                None => {
                    free.get_or_insert(index);
                }
            }
        }
        free.map_or(PortSearchResult::Full, PortSearchResult::Found)
    }

    /// Place `link` in the lowest free slot. Fails without touching the table if
    /// the address is already attached or no slot is free.
    pub fn attach(&mut self, link: Link) -> Result<usize> {
        match self.search(&link.remote.simulated_ip) {
            PortSearchResult::Found(index) => {
                self.slots[index] = Some(link);
                Ok(index)
            }
            PortSearchResult::Full => Err(RouterError::NoFreePort),
            PortSearchResult::Duplicate(_) => {
                Err(RouterError::DuplicateAttachment(link.remote.simulated_ip))
            }
        }
    }

    pub fn detach(&mut self, index: usize) -> Result<Option<Link>> {
        let capacity = self.capacity();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(RouterError::InvalidPortIndex { index, capacity })?;
        Ok(slot.take())
    }

    pub fn get(&self, index: usize) -> Option<&Link> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Link> {
        self.slots.get_mut(index).and_then(Option::as_mut)
    }

    pub fn position_of(&self, simulated_ip: &str) -> Option<usize> {
        self.slots.iter().position(|slot| {
            slot.as_ref()
                .is_some_and(|link| link.remote.simulated_ip == simulated_ip)
        })
    }

    pub fn find(&self, simulated_ip: &str) -> Option<&Link> {
        self.position_of(simulated_ip).and_then(|index| self.get(index))
    }

    pub fn find_mut(&mut self, simulated_ip: &str) -> Option<&mut Link> {
        let index = self.position_of(simulated_ip)?;
        self.get_mut(index)
    }

    /// Occupied slots with their index.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Link)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|link| (index, link)))
    }

    pub fn two_way_links(&self) -> impl Iterator<Item = (usize, &Link)> {
        self.iter().filter(|(_, link)| link.is_two_way())
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}
