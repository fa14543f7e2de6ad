use std::marker::PhantomData;

use log::debug;

use crate::core::Result;
use crate::driver::RowCursor;
use crate::meta::Entity;

use super::options::RecordFilter;
use super::query::RowMapper;

/// Forward-only typed reader over a select.
///
/// Independent of the connection that opened it: closing the reader never
/// closes the connection, and the reader must be closed (or dropped) on its
/// own.
pub struct ForwardReader<T: Entity> {
    cursor: Option<Box<dyn RowCursor>>,
    mapper: RowMapper,
    filter: Option<RecordFilter>,
    _record: PhantomData<fn() -> T>,
}

impl<T: Entity> ForwardReader<T> {
    pub(crate) fn new(
        cursor: Box<dyn RowCursor>,
        mapper: RowMapper,
        filter: Option<RecordFilter>,
    ) -> Self {
        Self {
            cursor: Some(cursor),
            mapper,
            filter,
            _record: PhantomData,
        }
    }

    /// Next record passing the filter, or `None` at the end or after close.
    pub fn read(&mut self) -> Result<Option<T>> {
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(None);
        };

        while let Some(row) = cursor.next_row()? {
            let record: T = self.mapper.read(row)?;
            if self.filter.as_ref().is_none_or(|f| f(&record)) {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    pub fn columns(&self) -> &[String] {
        self.cursor.as_ref().map_or(&[] as &[String], |c| c.columns())
    }

    pub fn is_closed(&self) -> bool {
        self.cursor.is_none()
    }

    pub fn close(&mut self) {
        if self.cursor.take().is_some() {
            debug!("Forward reader for {} closed", T::description().type_name);
        }
    }
}

impl<T: Entity> Iterator for ForwardReader<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read().transpose()
    }
}

impl<T: Entity> Drop for ForwardReader<T> {
    fn drop(&mut self) {
        self.close();
    }
}
