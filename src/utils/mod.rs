pub mod backoff;

pub mod time;

#[cfg(test)]
mod time_test;
