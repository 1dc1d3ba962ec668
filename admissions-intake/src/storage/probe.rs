//! Length measurement for seekable upload sources

use std::io::{self, Seek, SeekFrom};
use tokio::io::{AsyncSeek, AsyncSeekExt};

/// Returns the total length of `source` in bytes
///
/// The read position is restored to where it was before the call, so the
/// caller can keep reading as if nothing happened. Nothing is buffered.
///
/// # Errors
///
/// Propagates any seek error from the source.
///
/// # Examples
///
/// ```rust
/// use admissions_intake::storage::probe::probe_len;
/// use std::io::Cursor;
///
/// # async fn example() -> std::io::Result<()> {
/// let mut cursor = Cursor::new(vec![0_u8; 1024]);
/// assert_eq!(probe_len(&mut cursor).await?, 1024);
/// assert_eq!(cursor.position(), 0);
/// # Ok(())
/// # }
/// ```
pub async fn probe_len<R>(source: &mut R) -> io::Result<u64>
where
    R: AsyncSeek + Unpin + ?Sized,
{
    let position = source.stream_position().await?;
    let len = source.seek(SeekFrom::End(0)).await?;
    source.seek(SeekFrom::Start(position)).await?;
    Ok(len)
}

/// Blocking twin of [`probe_len`] for `std::io::Seek` sources
///
/// # Errors
///
/// Propagates any seek error from the source.
pub fn probe_len_blocking<R>(source: &mut R) -> io::Result<u64>
where
    R: Seek + ?Sized,
{
    let position = source.stream_position()?;
    let len = source.seek(SeekFrom::End(0))?;
    source.seek(SeekFrom::Start(position))?;
    Ok(len)
}
