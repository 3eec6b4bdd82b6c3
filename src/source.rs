use std::{iter::Cloned, slice};

/// A re-iterable source of batches.
///
/// Every call to `batches` starts a fresh traversal (one epoch). What a batch is
/// doesn't matter to the loop.
pub trait BatchSource {
    type Batch;
    type Iter: Iterator<Item = Self::Batch>;

    /// Starts a new traversal of the source.
    fn batches(&mut self) -> Self::Iter;

    /// Number of batches per traversal, if the source knows it up front.
    fn len_hint(&self) -> Option<usize> {
        None
    }
}

impl<T: Clone> BatchSource for Vec<T> {
    type Batch = T;
    type Iter = std::vec::IntoIter<T>;

    fn batches(&mut self) -> Self::Iter {
        self.clone().into_iter()
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.len())
    }
}

impl<'a, T: Clone> BatchSource for &'a [T] {
    type Batch = T;
    type Iter = Cloned<slice::Iter<'a, T>>;

    fn batches(&mut self) -> Self::Iter {
        self.iter().cloned()
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.len())
    }
}

/// Source backed by a closure returning a fresh iterator per traversal.
///
/// Reports no length, so a loop over it detects epoch ends by reading ahead unless a
/// length is given explicitly.
#[derive(Debug, Clone)]
pub struct FromFn<F> {
    f: F,
}

/// Creates a `FromFn` source.
///
/// # Args
/// * `f` - Called once per epoch to start a traversal.
pub fn from_fn<F, I>(f: F) -> FromFn<F>
where
    F: FnMut() -> I,
    I: IntoIterator,
{
    FromFn { f }
}

impl<F, I> BatchSource for FromFn<F>
where
    F: FnMut() -> I,
    I: IntoIterator,
{
    type Batch = I::Item;
    type Iter = I::IntoIter;

    fn batches(&mut self) -> Self::Iter {
        (self.f)().into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_source_restarts_each_traversal() {
        let mut src = vec![1, 2, 3];
        assert_eq!(src.batches().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(src.batches().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(src.len_hint(), Some(3));
    }

    #[test]
    fn slice_source_reports_len() {
        let data = [10, 20];
        let mut src: &[i32] = &data;
        assert_eq!(src.batches().collect::<Vec<_>>(), vec![10, 20]);
        assert_eq!(src.len_hint(), Some(2));
    }

    #[test]
    fn fn_source_has_no_len() {
        let mut calls = 0;
        let mut src = from_fn(|| {
            calls += 1;
            0..4
        });
        assert_eq!(src.len_hint(), None);
        assert_eq!(src.batches().count(), 4);
        assert_eq!(src.batches().count(), 4);
        drop(src);
        assert_eq!(calls, 2);
    }
}
