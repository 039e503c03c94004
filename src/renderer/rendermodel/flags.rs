use bitflags::bitflags;

bitflags! {
    /// Per-object state that changes how an object is drawn without
    /// touching its geometry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ObjectFlags: u32 {
        const HIDDEN = 1 << 0;
    }
}

impl ObjectFlags {
    pub fn is_hidden(self) -> bool {
        self.contains(ObjectFlags::HIDDEN)
    }
}
