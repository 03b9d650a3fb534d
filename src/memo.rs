/// A single-entry lazy cache.
///
/// A `Memo` starts out unset and is populated at most once, on the first
/// forcing read. Once set, the stored value never changes: there is no
/// invalidation and no mutable access to the contents. The forcing reads
/// take `&mut self`, so neither concurrent nor re-entrant first reads can
/// be expressed against the same slot.
pub struct Memo<T> {
    slot: Option<T>,
}

impl<T> Memo<T> {
    /// Returns a new, empty `Memo`.
    pub const fn unset() -> Self {
        Self { slot: None }
    }

    /// Returns the cached value without forcing a computation.
    pub fn get(&self) -> Option<&T> {
        self.slot.as_ref()
    }

    /// Returns `true` if the slot has been populated.
    pub fn is_set(&self) -> bool {
        self.slot.is_some()
    }

    /// Returns the cached value, running `compute` to fill the slot if it
    /// is still unset. `compute` runs at most once over the life of the slot.
    pub fn get_or_init<F>(&mut self, compute: F) -> &T
    where
        F: FnOnce() -> T,
    {
        &*self.slot.get_or_insert_with(compute)
    }

    /// Fallible variant of [`Memo::get_or_init`].
    ///
    /// If `compute` fails, the error propagates unchanged and the slot stays
    /// unset, so the next forcing read runs `compute` again. Side effects of
    /// a failed attempt are not rolled back.
    pub fn get_or_try_init<F, E>(&mut self, compute: F) -> Result<&T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        if self.slot.is_none() {
            self.slot = Some(compute()?);
        }

        // The slot was either already set or has just been filled.
        Ok(self.slot.as_ref().unwrap())
    }
}

impl<T> Default for Memo<T> {
    fn default() -> Self {
        Self::unset()
    }
}
