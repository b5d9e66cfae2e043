//! In-memory fakes for the agent service and the repository host.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::agents_api::{AgentDefinition, AgentsApi, MessageRole, RunStatus, ThreadMessage};
use crate::error::CoreError;
use crate::repo::{RepoId, RepositoryFile, RepositoryInfo, RepositoryProvider};
use crate::session::RunState;

enum Script {
    Run {
        states: VecDeque<RunState>,
        answer: Option<String>,
        last_error: Option<String>,
    },
    RejectRun,
}

struct ActiveRun {
    states: VecDeque<RunState>,
    last: RunState,
    answer: Option<String>,
    last_error: Option<String>,
}

#[derive(Default)]
struct ScriptState {
    scripts: VecDeque<Script>,
    threads: HashMap<String, ActiveRun>,
    created: Vec<AgentDefinition>,
    deleted: Vec<String>,
    posted: Vec<String>,
    get_run_calls: usize,
    next_id: usize,
    fail_thread: bool,
    fail_delete: bool,
}

impl ScriptState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}_{}", self.next_id)
    }
}

/// Agent service that replays scripted runs in `create_run` order.
///
/// When the script is exhausted `create_run` fails with a transport error.
#[derive(Default)]
pub(crate) struct ScriptedAgentsApi {
    state: Mutex<ScriptState>,
}

impl ScriptedAgentsApi {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state.lock().expect("script state lock poisoned")
    }

    /// Script a run that walks through `states` and answers with `answer`.
    ///
    /// After the last state is reported it keeps being reported.
    pub(crate) fn push_run(
        &self,
        states: impl IntoIterator<Item = RunState>,
        answer: Option<&str>,
    ) {
        self.lock().scripts.push_back(Script::Run {
            states: states.into_iter().collect(),
            answer: answer.map(str::to_owned),
            last_error: None,
        });
    }

    /// Script a run that ends in `state` with `last_error` as detail.
    pub(crate) fn push_failed_run(&self, state: RunState, last_error: Option<&str>) {
        self.lock().scripts.push_back(Script::Run {
            states: VecDeque::from([RunState::Queued, state]),
            answer: None,
            last_error: last_error.map(str::to_owned),
        });
    }

    /// Script a run whose creation is rejected by the service.
    pub(crate) fn push_rejected_run(&self) {
        self.lock().scripts.push_back(Script::RejectRun);
    }

    pub(crate) fn fail_thread_creation(&self) {
        self.lock().fail_thread = true;
    }

    pub(crate) fn fail_deletion(&self) {
        self.lock().fail_delete = true;
    }

    pub(crate) fn get_run_calls(&self) -> usize {
        self.lock().get_run_calls
    }

    pub(crate) fn created_agents(&self) -> Vec<AgentDefinition> {
        self.lock().created.clone()
    }

    pub(crate) fn deleted_agents(&self) -> Vec<String> {
        self.lock().deleted.clone()
    }

    pub(crate) fn posted_messages(&self) -> Vec<String> {
        self.lock().posted.clone()
    }
}

#[async_trait]
impl AgentsApi for ScriptedAgentsApi {
    async fn create_agent(&self, definition: &AgentDefinition) -> Result<String, CoreError> {
        let mut state = self.lock();
        state.created.push(definition.clone());
        Ok(state.next_id("asst"))
    }

    async fn create_thread(&self) -> Result<String, CoreError> {
        let mut state = self.lock();
        if state.fail_thread {
            return Err(CoreError::Transport("thread creation refused".to_owned()));
        }
        Ok(state.next_id("thread"))
    }

    async fn create_message(&self, _thread_id: &str, content: &str) -> Result<(), CoreError> {
        self.lock().posted.push(content.to_owned());
        Ok(())
    }

    async fn create_run(&self, thread_id: &str, _agent_id: &str) -> Result<RunStatus, CoreError> {
        let mut state = self.lock();
        match state.scripts.pop_front() {
            Some(Script::Run {
                states,
                answer,
                last_error,
            }) => {
                state.threads.insert(
                    thread_id.to_owned(),
                    ActiveRun {
                        states,
                        last: RunState::Queued,
                        answer,
                        last_error,
                    },
                );
                let id = state.next_id("run");
                Ok(RunStatus {
                    id,
                    state: RunState::Queued,
                    last_error: None,
                })
            }
            Some(Script::RejectRun) => Err(CoreError::Transport("run rejected".to_owned())),
            None => Err(CoreError::Transport("no scripted run".to_owned())),
        }
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<RunStatus, CoreError> {
        let mut state = self.lock();
        state.get_run_calls += 1;
        let run = state
            .threads
            .get_mut(thread_id)
            .ok_or_else(|| CoreError::Transport(format!("unknown thread {thread_id}")))?;
        if let Some(next) = run.states.pop_front() {
            run.last = next;
        }
        let last_error = match run.last {
            RunState::Failed | RunState::Cancelled | RunState::Expired => run.last_error.clone(),
            _ => None,
        };
        Ok(RunStatus {
            id: run_id.to_owned(),
            state: run.last,
            last_error,
        })
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, CoreError> {
        let state = self.lock();
        let mut messages = vec![ThreadMessage {
            role: MessageRole::User,
            text: state.posted.last().cloned().unwrap_or_default(),
        }];
        if let Some(answer) = state.threads.get(thread_id).and_then(|r| r.answer.clone()) {
            messages.push(ThreadMessage {
                role: MessageRole::Assistant,
                text: answer,
            });
        }
        Ok(messages)
    }

    async fn delete_agent(&self, agent_id: &str) -> Result<(), CoreError> {
        let mut state = self.lock();
        state.deleted.push(agent_id.to_owned());
        if state.fail_delete {
            return Err(CoreError::Transport("delete refused".to_owned()));
        }
        Ok(())
    }
}

/// Repository host serving fixed data for any repository id.
#[derive(Default)]
pub(crate) struct StaticRepositoryProvider {
    info: Option<RepositoryInfo>,
    readme: Option<String>,
    files: BTreeMap<String, String>,
    listing: Vec<RepositoryFile>,
    languages: BTreeMap<String, u64>,
    failing: bool,
}

impl StaticRepositoryProvider {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every call fails with a transport error.
    pub(crate) fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub(crate) fn with_info(mut self, owner: &str, repo: &str) -> Self {
        self.info = Some(RepositoryInfo {
            name: repo.to_owned(),
            full_name: format!("{owner}/{repo}"),
            description: format!("{repo} description"),
            default_branch: "main".to_owned(),
            stars: 42,
        });
        self
    }

    pub(crate) fn with_readme(mut self, readme: &str) -> Self {
        self.readme = Some(readme.to_owned());
        self
    }

    /// Adds a file with content; it also shows up in the listing.
    pub(crate) fn with_file(mut self, path: &str, content: &str) -> Self {
        self.files.insert(path.to_owned(), content.to_owned());
        self.listing.push(RepositoryFile::blob(path));
        self
    }

    /// Adds a listing entry without fetchable content.
    pub(crate) fn with_entry(mut self, entry: RepositoryFile) -> Self {
        self.listing.push(entry);
        self
    }

    pub(crate) fn with_language(mut self, name: &str, bytes: u64) -> Self {
        self.languages.insert(name.to_owned(), bytes);
        self
    }

    fn check(&self) -> Result<(), CoreError> {
        if self.failing {
            return Err(CoreError::Transport("repository host unreachable".to_owned()));
        }
        Ok(())
    }
}

#[async_trait]
impl RepositoryProvider for StaticRepositoryProvider {
    async fn repository_info(&self, _repo: &RepoId) -> Result<Option<RepositoryInfo>, CoreError> {
        self.check()?;
        Ok(self.info.clone())
    }

    async fn readme(&self, _repo: &RepoId) -> Result<Option<String>, CoreError> {
        self.check()?;
        Ok(self.readme.clone())
    }

    async fn file_content(&self, _repo: &RepoId, path: &str) -> Result<Option<String>, CoreError> {
        self.check()?;
        Ok(self.files.get(path).cloned())
    }

    async fn list_files(
        &self,
        _repo: &RepoId,
        _git_ref: &str,
    ) -> Result<Vec<RepositoryFile>, CoreError> {
        self.check()?;
        Ok(self.listing.clone())
    }

    async fn languages(&self, _repo: &RepoId) -> Result<BTreeMap<String, u64>, CoreError> {
        self.check()?;
        Ok(self.languages.clone())
    }
}
