use ash::vk;

/// The single queue every submission in this crate goes through
pub struct Queue {
    pub family: QueueFamily,
    pub handle: vk::Queue,
}

impl Queue {
    pub fn new(
        family: QueueFamily,
        handle: vk::Queue,
    ) -> Self {
        Self {
            family,
            handle,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct QueueFamily {
    pub index: u32,
}

impl QueueFamily {
    pub fn new(index: u32) -> Self {
        Self { index }
    }
}
