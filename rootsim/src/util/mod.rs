pub(crate) mod calendar_queue;
pub(crate) mod list;
