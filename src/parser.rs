//! Multi-stage parser pipeline. Each stage owns a bounded FIFO queue and
//! a worker pool; a task traverses the stages in order and its progress
//! is persisted on the File row so a restart resumes where it left off.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use crate::config::Config;
use crate::error::Result;
use crate::file::{File, FileType, ParserStep, PARSER_STEP_FATAL};
use crate::library::Notifier;
use crate::media::{AudioTrack, VideoTrack};
use crate::store::Store;

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Status {
    Success,
    Fatal,
    Discarded,
    Retry,
}

/// Mutable bag of intermediate metadata filled by the probe stage and
/// consumed by the persister.
#[derive(Debug, Default, Clone)]
pub struct ParsedItem {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub album_name: Option<String>,
    pub genre: Option<String>,
    pub show_name: Option<String>,
    pub release_date: Option<String>,
    pub artwork_mrl: Option<String>,
    pub track_number: i64,
    pub episode: i64,
    pub disc_number: i64,
    pub disc_total: i64,
    /// Milliseconds; -1 while unknown.
    pub duration: i64,
    pub audio_tracks: Vec<AudioTrack>,
    pub video_tracks: Vec<VideoTrack>,
}

impl ParsedItem {
    pub fn new() -> ParsedItem {
        ParsedItem {
            duration: -1,
            ..Default::default()
        }
    }
}

/// One unit of work traversing the pipeline for one File.
#[derive(Debug, Clone)]
pub struct Task {
    pub file_id: i64,
    pub mrl: String,
    pub file_type: FileType,
    pub media_id: Option<i64>,
    /// Index of the next stage to run; mirrored into File.parser_step.
    pub step: usize,
    pub retry_count: u32,
    pub item: ParsedItem,
}

impl Task {
    pub fn new(file_id: i64, mrl: &str, file_type: FileType) -> Task {
        Task {
            file_id,
            mrl: mrl.to_string(),
            file_type,
            media_id: None,
            step: ParserStep::None as usize,
            retry_count: 0,
            item: ParsedItem::new(),
        }
    }
}

pub trait MetadataService: Send + Sync {
    fn name(&self) -> &'static str;

    fn nb_threads(&self) -> usize {
        1
    }

    fn run(&self, task: &mut Task) -> Status;
}

struct Stage {
    service: Arc<dyn MetadataService>,
    sender: Sender<Task>,
    receiver: Receiver<Task>,
}

struct Shared {
    stages: Vec<Stage>,
    store: Arc<Store>,
    notifier: Arc<Notifier>,
    retry_max: u32,
    shutdown_grace: Duration,
    running: AtomicBool,
    paused: Mutex<bool>,
    unpaused: Condvar,
    done: AtomicU32,
    scheduled: AtomicU32,
}

pub struct Parser {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Parser {
    pub fn new(
        store: Arc<Store>,
        notifier: Arc<Notifier>,
        config: &Config,
        services: Vec<Arc<dyn MetadataService>>,
    ) -> Parser {
        let stages = services
            .into_iter()
            .map(|service| {
                let (sender, receiver) = bounded(config.stage_queue_cap);
                Stage {
                    service,
                    sender,
                    receiver,
                }
            })
            .collect();

        Parser {
            shared: Arc::new(Shared {
                stages,
                store,
                notifier,
                retry_max: config.parser_retry_max,
                shutdown_grace: config.shutdown_grace,
                running: AtomicBool::new(false),
                paused: Mutex::new(false),
                unpaused: Condvar::new(),
                done: AtomicU32::new(0),
                scheduled: AtomicU32::new(0),
            }),
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn start(&self) {
        let mut workers = self.workers.lock().unwrap();
        if !workers.is_empty() {
            return;
        }

        self.shared.running.store(true, Ordering::SeqCst);

        for (index, stage) in self.shared.stages.iter().enumerate() {
            let nb_threads = stage.service.nb_threads().max(1);
            debug!(
                "starting {} worker(s) for stage '{}'",
                nb_threads,
                stage.service.name()
            );

            for _ in 0..nb_threads {
                let shared = self.shared.clone();
                workers.push(std::thread::spawn(move || {
                    Shared::worker_loop(&shared, index);
                }));
            }
        }
    }

    /// Re-enqueues every file whose parsing never reached a terminal
    /// step. Idempotent: each stage's writes are upserts keyed by stable
    /// identifiers, so replaying a stage is a no-op.
    pub fn restore(&self) -> Result<()> {
        let files = File::incomplete(&self.shared.store, self.shared.stages.len() as i64)?;
        if files.is_empty() {
            return Ok(());
        }

        info!("restoring {} interrupted parsing task(s)", files.len());

        for file in files {
            let mut task = Task::new(file.id, &file.mrl, file.file_type);
            task.media_id = file.media_id;
            task.step = file.parser_step.max(0) as usize;
            self.push(task);
        }

        Ok(())
    }

    /// Hands a task to its stage queue, blocking when the queue is full
    /// so a lagging stage back-pressures the producer.
    pub fn push(&self, task: Task) {
        self.shared.schedule(task);
    }

    /// Workers finish their current task and then hold off dequeueing.
    pub fn pause(&self) {
        debug!("pausing parser");
        *self.shared.paused.lock().unwrap() = true;
    }

    pub fn resume(&self) {
        debug!("resuming parser");
        *self.shared.paused.lock().unwrap() = false;
        self.shared.unpaused.notify_all();
    }

    /// Drains within the shutdown grace period, then cancels: whatever is
    /// still queued stays at its persisted step and is restored on the
    /// next start.
    pub fn stop(&self) {
        let deadline = std::time::Instant::now() + self.shared.shutdown_grace;
        while !self.is_idle() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(50));
        }

        self.shared.running.store(false, Ordering::SeqCst);
        self.resume();

        let mut workers = self.workers.lock().unwrap();
        for worker in workers.drain(..) {
            let _ = worker.join();
        }
    }

    pub fn stats(&self) -> (u32, u32) {
        (
            self.shared.done.load(Ordering::SeqCst),
            self.shared.scheduled.load(Ordering::SeqCst),
        )
    }

    /// True once every scheduled task reached a terminal state. Test and
    /// shutdown helper.
    pub fn is_idle(&self) -> bool {
        let (done, scheduled) = self.stats();
        done == scheduled
    }
}

impl Shared {
    fn schedule(&self, task: Task) {
        if task.step >= self.stages.len() {
            return;
        }

        self.scheduled.fetch_add(1, Ordering::SeqCst);
        self.publish_stats();

        // Blocking send: the queue cap is the back-pressure boundary.
        let _ = self.stages[task.step].sender.send(task);
    }

    fn wait_while_paused(&self) {
        let mut paused = self.paused.lock().unwrap();
        while *paused && self.running.load(Ordering::SeqCst) {
            let (guard, _) = self
                .unpaused
                .wait_timeout(paused, Duration::from_millis(200))
                .unwrap();
            paused = guard;
        }
    }

    fn worker_loop(shared: &Arc<Shared>, stage_index: usize) {
        let stage = &shared.stages[stage_index];

        loop {
            shared.wait_while_paused();
            if !shared.running.load(Ordering::SeqCst) {
                return;
            }

            let task = match stage.receiver.recv_timeout(Duration::from_millis(200)) {
                Ok(task) => task,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return,
            };

            // A pause that raced the dequeue parks the task here; its
            // progress is already persisted, so a shutdown loses nothing.
            shared.wait_while_paused();
            if !shared.running.load(Ordering::SeqCst) {
                return;
            }

            shared.process(stage_index, task);
        }
    }

    fn process(&self, stage_index: usize, mut task: Task) {
        let stage = &self.stages[stage_index];
        trace!(
            "stage '{}' takes file {}",
            stage.service.name(),
            task.file_id
        );

        let status = stage.service.run(&mut task);

        match status {
            Status::Success => {
                task.step = stage_index + 1;
                task.retry_count = 0;

                // The persisting stages stamp the cursor inside their own
                // transaction; this backstop covers the ones that don't
                // touch the store.
                let _ = File::set_parser_step(&self.store, task.file_id, task.step as i64);

                if task.step >= self.stages.len() {
                    trace!("file {} completed", task.file_id);
                    self.finish_one();
                } else {
                    self.forward(task);
                }
            }
            Status::Retry => {
                task.retry_count += 1;
                if task.retry_count > self.retry_max {
                    warn!(
                        "file {} exceeded {} retries at stage '{}', degrading to fatal",
                        task.file_id,
                        self.retry_max,
                        stage.service.name()
                    );
                    self.fail(&task);
                } else {
                    debug!(
                        "file {} retrying stage '{}' ({}/{})",
                        task.file_id,
                        stage.service.name(),
                        task.retry_count,
                        self.retry_max
                    );
                    let _ = self.stages[stage_index].sender.send(task);
                }
            }
            Status::Fatal => {
                error!(
                    "file {} failed fatally at stage '{}'",
                    task.file_id,
                    stage.service.name()
                );
                self.fail(&task);
            }
            Status::Discarded => {
                debug!(
                    "file {} discarded at stage '{}'",
                    task.file_id,
                    stage.service.name()
                );
                self.fail(&task);
            }
        }
    }

    fn forward(&self, task: Task) {
        let _ = self.stages[task.step].sender.send(task);
    }

    fn fail(&self, task: &Task) {
        let _ = File::set_parser_step(&self.store, task.file_id, PARSER_STEP_FATAL);
        self.finish_one();
    }

    fn finish_one(&self) {
        self.done.fetch_add(1, Ordering::SeqCst);
        self.publish_stats();
    }

    fn publish_stats(&self) {
        self.notifier.parsing_stats_updated(
            self.done.load(Ordering::SeqCst),
            self.scheduled.load(Ordering::SeqCst),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::FileType;
    use crate::test_support::{test_folder, test_store};
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    struct CountingService {
        name: &'static str,
        runs: AtomicUsize,
        result: Status,
    }

    impl CountingService {
        fn new(name: &'static str, result: Status) -> Arc<CountingService> {
            Arc::new(CountingService {
                name,
                runs: AtomicUsize::new(0),
                result,
            })
        }
    }

    impl MetadataService for CountingService {
        fn name(&self) -> &'static str {
            self.name
        }

        fn run(&self, _task: &mut Task) -> Status {
            self.runs.fetch_add(1, Ordering::SeqCst);
            self.result
        }
    }

    fn wait_idle(parser: &Parser) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !parser.is_idle() {
            assert!(Instant::now() < deadline, "pipeline failed to drain");
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    fn file_step(store: &Store, file_id: i64) -> i64 {
        store.caches.file.invalidate(file_id);
        File::fetch(store, file_id).unwrap().unwrap().parser_step
    }

    #[test]
    fn tasks_traverse_all_stages_in_order() {
        let (store, _dir) = test_store();
        let store = Arc::new(store);
        let folder = test_folder(&store);
        let file = File::create(
            &store,
            "file:///m/a.mp3",
            "a.mp3",
            FileType::Audio,
            folder.id,
            1,
            10,
        )
        .unwrap();

        let first = CountingService::new("first", Status::Success);
        let second = CountingService::new("second", Status::Success);
        let notifier = Arc::new(Notifier::new(Default::default(), 16));
        let config = crate::Config::new("unused", "unused");
        let parser = Parser::new(
            store.clone(),
            notifier,
            &config,
            vec![first.clone(), second.clone()],
        );

        parser.start();
        parser.push(Task::new(file.id, &file.mrl, file.file_type));
        wait_idle(&parser);
        parser.stop();

        assert_eq!(first.runs.load(Ordering::SeqCst), 1);
        assert_eq!(second.runs.load(Ordering::SeqCst), 1);
        assert_eq!(file_step(&store, file.id), 2);
    }

    #[test]
    fn retries_degrade_to_fatal() {
        let (store, _dir) = test_store();
        let store = Arc::new(store);
        let folder = test_folder(&store);
        let file = File::create(
            &store,
            "file:///m/a.mp3",
            "a.mp3",
            FileType::Audio,
            folder.id,
            1,
            10,
        )
        .unwrap();

        let flaky = CountingService::new("flaky", Status::Retry);
        let notifier = Arc::new(Notifier::new(Default::default(), 16));
        let config = crate::Config::new("unused", "unused");
        let parser = Parser::new(store.clone(), notifier, &config, vec![flaky.clone()]);

        parser.start();
        parser.push(Task::new(file.id, &file.mrl, file.file_type));
        wait_idle(&parser);
        parser.stop();

        // Initial run plus parser_retry_max retries.
        assert_eq!(flaky.runs.load(Ordering::SeqCst), 4);
        assert_eq!(file_step(&store, file.id), PARSER_STEP_FATAL);
    }

    #[test]
    fn restore_resumes_from_persisted_step() {
        let (store, _dir) = test_store();
        let store = Arc::new(store);
        let folder = test_folder(&store);
        let file = File::create(
            &store,
            "file:///m/a.mp3",
            "a.mp3",
            FileType::Audio,
            folder.id,
            1,
            10,
        )
        .unwrap();
        File::set_parser_step(&store, file.id, 1).unwrap();

        let first = CountingService::new("first", Status::Success);
        let second = CountingService::new("second", Status::Success);
        let notifier = Arc::new(Notifier::new(Default::default(), 16));
        let config = crate::Config::new("unused", "unused");
        let parser = Parser::new(
            store.clone(),
            notifier,
            &config,
            vec![first.clone(), second.clone()],
        );

        parser.start();
        parser.restore().unwrap();
        wait_idle(&parser);
        parser.stop();

        // The first stage already ran before the restart.
        assert_eq!(first.runs.load(Ordering::SeqCst), 0);
        assert_eq!(second.runs.load(Ordering::SeqCst), 1);
        assert_eq!(file_step(&store, file.id), 2);
    }

    #[test]
    fn paused_workers_do_not_dequeue() {
        let (store, _dir) = test_store();
        let store = Arc::new(store);
        let folder = test_folder(&store);
        let file = File::create(
            &store,
            "file:///m/a.mp3",
            "a.mp3",
            FileType::Audio,
            folder.id,
            1,
            10,
        )
        .unwrap();

        let service = CountingService::new("only", Status::Success);
        let notifier = Arc::new(Notifier::new(Default::default(), 16));
        let config = crate::Config::new("unused", "unused");
        let parser = Parser::new(store.clone(), notifier, &config, vec![service.clone()]);

        parser.start();
        parser.pause();
        parser.push(Task::new(file.id, &file.mrl, file.file_type));

        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(service.runs.load(Ordering::SeqCst), 0);

        parser.resume();
        wait_idle(&parser);
        parser.stop();
        assert_eq!(service.runs.load(Ordering::SeqCst), 1);
    }
}
