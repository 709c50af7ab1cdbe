//! Watch a scratch directory, mutate it, and print the events the
//! scheduler reports

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use io_monitor::{
    ChannelListener, DirectoryObserver, EventKind, FileFilter, FilterOptions, PollingScheduler,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    println!("Directory Observer Example");
    println!("==========================");

    let temp_dir = tempfile::TempDir::new()?;
    let root = temp_dir.path().join("watched");
    tokio::fs::create_dir_all(root.join("subdir")).await?;
    tokio::fs::write(root.join("file1.txt"), b"This is file 1 content").await?;

    println!("Watching: {}", root.display());
    println!();

    let filter = FileFilter::new(FilterOptions {
        exclude_patterns: vec!["**/*.tmp".to_string()],
        ..Default::default()
    })?;
    let observer = DirectoryObserver::new(&root)?.with_filter(filter);
    let (listener, mut events) = ChannelListener::channel();
    observer.add_listener(Arc::new(listener));

    let scheduler = PollingScheduler::new(Duration::from_millis(100));
    scheduler.add_observer(Arc::new(observer));
    scheduler.start()?;

    tokio::fs::write(root.join("file2.txt"), b"This is file 2 content").await?;
    tokio::fs::write(root.join("subdir").join("file3.txt"), b"nested").await?;
    tokio::fs::write(root.join("ignored.tmp"), b"scratch").await?;
    tokio::time::sleep(Duration::from_millis(300)).await;

    tokio::fs::remove_dir_all(root.join("subdir")).await?;
    tokio::time::sleep(Duration::from_millis(300)).await;

    scheduler.stop()?;

    while let Ok(event) = events.try_recv() {
        if event.kind != EventKind::Start && event.kind != EventKind::Stop {
            println!("{:?}: {}", event.kind, event.path.display());
        }
    }

    Ok(())
}
