use bytemuck::Pod;
use std::sync::Arc;

/// Caller-owned source of an allocation's bytes.
///
/// The allocators never keep a copy of handle data; when defragmentation moves
/// an allocation they fetch the current contents from here and re-upload.
pub trait DataProvider {
    fn fetch(&self) -> &[u8];
}

impl DataProvider for Vec<u8> {
    fn fetch(&self) -> &[u8] {
        self
    }
}

impl DataProvider for Box<[u8]> {
    fn fetch(&self) -> &[u8] {
        self
    }
}

/// Typed vertex/index data exposed as bytes.
#[derive(Debug, Clone, Default)]
pub struct PodData<T: Pod>(pub Vec<T>);

impl<T: Pod> PodData<T> {
    pub fn new(data: Vec<T>) -> Self {
        Self(data)
    }

    pub fn byte_len(&self) -> u64 {
        std::mem::size_of_val(self.0.as_slice()) as u64
    }

    pub fn into_provider(self) -> Arc<dyn DataProvider> {
        Arc::new(self)
    }
}

impl<T: Pod> DataProvider for PodData<T> {
    fn fetch(&self) -> &[u8] {
        bytemuck::cast_slice(&self.0)
    }
}

/// Opaque token for a live allocation. Stale tokens are rejected through the
/// generation counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllocHandle {
    index: u32,
    generation: u32,
}

impl AllocHandle {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Generational registry. Freed slots go back to a free list and are reused
/// by later insertions instead of growing the table.
#[derive(Debug)]
pub struct HandlePool<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
}

impl<T> Default for HandlePool<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }
}

impl<T> HandlePool<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, value: T) -> AllocHandle {
        self.live += 1;
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.value = Some(value);
                AllocHandle {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    value: Some(value),
                });
                AllocHandle {
                    index,
                    generation: 0,
                }
            }
        }
    }

    pub fn remove(&mut self, handle: AllocHandle) -> Option<T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.live -= 1;
        Some(value)
    }

    pub fn get(&self, handle: AllocHandle) -> Option<&T> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_ref()
    }

    pub fn get_mut(&mut self, handle: AllocHandle) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_mut()
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Number of slots ever created, live or pooled.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn handles(&self) -> impl Iterator<Item = AllocHandle> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|_| AllocHandle {
                index: index as u32,
                generation: slot.generation,
            })
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (AllocHandle, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    AllocHandle {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    value,
                )
            })
        })
    }
}
