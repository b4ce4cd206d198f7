//! A shared size budget wrapped around decompressing readers so a
//! gzip/xz/zip bomb fails before `max_bytes` decompressed bytes have been
//! materialized, rather than only after the fact (spec.md §4.3 /
//! SPEC_FULL.md §4.3). Shared via `Rc<Cell<_>>` because ZIP extraction
//! opens one reader per entry against a single running total, while tar
//! extraction opens exactly one.

use std::cell::Cell;
use std::io::{self, Read};
use std::rc::Rc;

#[derive(Clone)]
pub struct Budget(Rc<Cell<u64>>);

impl Budget {
    pub fn new(max_bytes: u64) -> Self {
        Self(Rc::new(Cell::new(max_bytes)))
    }

    pub fn wrap<R: Read>(&self, inner: R) -> BudgetedReader<R> {
        BudgetedReader {
            inner,
            budget: self.clone(),
        }
    }
}

pub struct BudgetedReader<R> {
    inner: R,
    budget: Budget,
}

impl<R: Read> Read for BudgetedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.budget.0.get();
        if remaining == 0 {
            // Exactly at budget: content whose decompressed size equals
            // `max_bytes` must still succeed (spec.md §4.3 fails only when
            // size *exceeds* `max_bytes`), so probe for a genuine EOF
            // rather than failing on the terminal zero-length read. Any
            // further byte means the stream really did overrun the budget.
            let mut probe = [0u8; 1];
            return if self.inner.read(&mut probe)? == 0 {
                Ok(0)
            } else {
                Err(io::Error::new(
                    io::ErrorKind::Other,
                    "decompressed size exceeds max_bytes",
                ))
            };
        }
        let cap = buf.len().min(remaining as usize);
        let n = self.inner.read(&mut buf[..cap])?;
        self.budget.0.set(remaining - n as u64);
        Ok(n)
    }
}
