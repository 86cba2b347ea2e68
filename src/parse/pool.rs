use std::cell::RefCell;

/// Thread-local pool for the two buffers a parsed document rents: the UTF-8
/// payload copy and the index row storage. Buffers come back zeroed over the
/// range that was in use, since payload bytes may be sensitive.
#[derive(Default)]
struct BufferPool {
    text: Vec<u8>,
    rows: Vec<u8>,
}

thread_local! {
    static BUFFER_POOL: RefCell<BufferPool> = RefCell::new(BufferPool::default());
}

pub(crate) fn take_text_buffer() -> Vec<u8> {
    BUFFER_POOL.with(|pool| std::mem::take(&mut pool.borrow_mut().text))
}

pub(crate) fn put_text_buffer(mut buffer: Vec<u8>) {
    buffer.fill(0);
    buffer.clear();
    BUFFER_POOL.with(|pool| pool.borrow_mut().text = buffer);
}

pub(crate) fn take_row_buffer() -> Vec<u8> {
    BUFFER_POOL.with(|pool| std::mem::take(&mut pool.borrow_mut().rows))
}

pub(crate) fn put_row_buffer(mut buffer: Vec<u8>) {
    buffer.fill(0);
    buffer.clear();
    BUFFER_POOL.with(|pool| pool.borrow_mut().rows = buffer);
}
