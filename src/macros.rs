#![allow(unused_macros)]

/// Helper macro for reading locked items, mapping poisoning to [`crate::Error::LockError`]
///
/// ```rust, ignore
///  let state = read_lock!(self.state)?;
///  println!("{:?}", state.result);
/// ```
macro_rules! read_lock {
    ($rwlock:expr) => {
        $rwlock.read().map_err(|_| crate::Error::LockError)
    };
}

/// Helper macro for writing to locked items, mapping poisoning to [`crate::Error::LockError`]
///
/// ```rust, ignore
///  let mut state = write_lock!(self.state)?;
///  state.result = Some(result);
/// ```
macro_rules! write_lock {
    ($rwlock:expr) => {
        $rwlock.write().map_err(|_| crate::Error::LockError)
    };
}
