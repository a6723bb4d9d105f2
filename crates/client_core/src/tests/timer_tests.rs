use super::*;

#[tokio::test(start_paused = true)]
async fn counts_whole_seconds_while_running() {
    let mut timer = ElapsedTimer::new();
    timer.start();
    assert!(timer.is_running());
    assert_eq!(timer.elapsed_secs(), 0);

    time::sleep(Duration::from_millis(3_500)).await;
    assert_eq!(timer.elapsed_secs(), 3);
}

#[tokio::test(start_paused = true)]
async fn stop_freezes_the_count() {
    let mut timer = ElapsedTimer::new();
    timer.start();
    time::sleep(Duration::from_millis(2_500)).await;

    assert!(timer.stop());
    time::sleep(Duration::from_secs(5)).await;

    assert!(!timer.is_running());
    assert_eq!(timer.elapsed_secs(), 2);
}

#[tokio::test(start_paused = true)]
async fn stop_is_idempotent() {
    let mut timer = ElapsedTimer::new();
    timer.start();
    time::sleep(Duration::from_millis(1_500)).await;

    assert!(timer.stop());
    let after_first = (timer.is_running(), timer.elapsed_secs());
    assert!(!timer.stop());
    let after_second = (timer.is_running(), timer.elapsed_secs());

    assert_eq!(after_first, after_second);
}

#[tokio::test]
async fn stop_without_start_is_a_no_op() {
    let mut timer = ElapsedTimer::new();
    assert!(!timer.stop());
    assert!(!timer.is_running());
    assert_eq!(timer.elapsed_secs(), 0);
}

#[tokio::test(start_paused = true)]
async fn restart_resets_the_counter() {
    let mut timer = ElapsedTimer::new();
    timer.start();
    time::sleep(Duration::from_millis(4_500)).await;
    assert_eq!(timer.elapsed_secs(), 4);

    timer.start();
    assert_eq!(timer.elapsed_secs(), 0);
    time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(timer.elapsed_secs(), 1);
}
