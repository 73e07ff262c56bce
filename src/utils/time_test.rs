use std::thread::sleep;

use crate::utils::time::get_duration_since_epoch;
use crate::utils::time::get_now_as_millis;

#[test]
fn test_get_duration_since_epoch() {
    let duration = get_duration_since_epoch();
    // Should be a reasonable value (somewhere between 1970 and now)
    assert!(duration.as_secs() > 1609459200); // Greater than 2021-01-01
}

#[test]
fn test_get_now_as_millis() {
    let t1 = get_now_as_millis();
    sleep(std::time::Duration::from_millis(10));
    let t2 = get_now_as_millis();

    // Ensure time is moving forward
    assert!(t2 > t1);
    // Difference should be at least 10ms
    assert!(t2 - t1 >= 10);
}
