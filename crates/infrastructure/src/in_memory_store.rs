use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use dtf_core::{
    CoordinationStore, SchedulerError, SchedulerResult, StoreBatch, StoreCommand, StoreReply,
};

/// 内存协调存储实现
///
/// 语义与 Redis 实现保持一致，适用于单节点运行和测试。
/// 每个批次在一次加锁内顺序执行，天然满足原子批次的要求；
/// 过期键在访问时惰性清理，空的列表、有序集合和哈希会被删除。
#[derive(Debug, Clone, Default)]
pub struct InMemoryCoordinationStore {
    state: Arc<Mutex<HashMap<String, Entry>>>,
}

#[derive(Debug, Clone)]
struct Entry {
    value: StoredValue,
    expires_at: Option<Instant>,
}

#[derive(Debug, Clone)]
enum StoredValue {
    Str(String),
    List(VecDeque<String>),
    ZSet(HashMap<String, f64>),
    Hash(HashMap<String, String>),
}

impl StoredValue {
    fn is_empty(&self) -> bool {
        match self {
            StoredValue::Str(_) => false,
            StoredValue::List(list) => list.is_empty(),
            StoredValue::ZSet(set) => set.is_empty(),
            StoredValue::Hash(hash) => hash.is_empty(),
        }
    }
}

fn wrong_type(key: &str) -> SchedulerError {
    SchedulerError::Store(format!("WRONGTYPE 键 {key} 的类型与命令不匹配"))
}

fn not_integer(key: &str) -> SchedulerError {
    SchedulerError::Store(format!("键 {key} 的值不是整数"))
}

/// 将可能为负的下标区间转换为 `[start, end)`
fn normalize_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize + 1))
}

/// 按分数升序、分数相同时按成员字典序排列
fn sorted_members(set: &HashMap<String, f64>) -> Vec<(&String, f64)> {
    let mut members: Vec<(&String, f64)> = set.iter().map(|(m, s)| (m, *s)).collect();
    members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));
    members
}

struct StoreState<'a> {
    entries: &'a mut HashMap<String, Entry>,
    now: Instant,
}

impl StoreState<'_> {
    fn purge_if_expired(&mut self, key: &str) {
        let expired = self
            .entries
            .get(key)
            .and_then(|entry| entry.expires_at)
            .is_some_and(|at| at <= self.now);
        if expired {
            self.entries.remove(key);
        }
    }

    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        self.purge_if_expired(key);
        self.entries.get_mut(key)
    }

    fn remove_if_empty(&mut self, key: &str) {
        if self
            .entries
            .get(key)
            .is_some_and(|entry| entry.value.is_empty())
        {
            self.entries.remove(key);
        }
    }

    fn list_mut(&mut self, key: &str) -> SchedulerResult<&mut VecDeque<String>> {
        self.purge_if_expired(key);
        let entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: StoredValue::List(VecDeque::new()),
            expires_at: None,
        });
        match &mut entry.value {
            StoredValue::List(list) => Ok(list),
            _ => Err(wrong_type(key)),
        }
    }

    fn zset_mut(&mut self, key: &str) -> SchedulerResult<&mut HashMap<String, f64>> {
        self.purge_if_expired(key);
        let entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: StoredValue::ZSet(HashMap::new()),
            expires_at: None,
        });
        match &mut entry.value {
            StoredValue::ZSet(set) => Ok(set),
            _ => Err(wrong_type(key)),
        }
    }

    fn hash_mut(&mut self, key: &str) -> SchedulerResult<&mut HashMap<String, String>> {
        self.purge_if_expired(key);
        let entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: StoredValue::Hash(HashMap::new()),
            expires_at: None,
        });
        match &mut entry.value {
            StoredValue::Hash(hash) => Ok(hash),
            _ => Err(wrong_type(key)),
        }
    }

    fn apply(&mut self, command: &StoreCommand) -> SchedulerResult<StoreReply> {
        let reply = match command {
            StoreCommand::Get { key } => match self.live(key) {
                None => StoreReply::Nil,
                Some(Entry {
                    value: StoredValue::Str(value),
                    ..
                }) => StoreReply::Value(value.clone()),
                Some(_) => return Err(wrong_type(key)),
            },
            StoreCommand::Set { key, value, ttl } => {
                let expires_at = ttl.map(|ttl| self.now + ttl);
                self.entries.insert(
                    key.clone(),
                    Entry {
                        value: StoredValue::Str(value.clone()),
                        expires_at,
                    },
                );
                StoreReply::Ok
            }
            StoreCommand::SetNx { key, value, ttl } => {
                if self.live(key).is_some() {
                    StoreReply::Int(0)
                } else {
                    let expires_at = ttl.map(|ttl| self.now + ttl);
                    self.entries.insert(
                        key.clone(),
                        Entry {
                            value: StoredValue::Str(value.clone()),
                            expires_at,
                        },
                    );
                    StoreReply::Int(1)
                }
            }
            StoreCommand::Del { key } => {
                self.purge_if_expired(key);
                StoreReply::Int(i64::from(self.entries.remove(key).is_some()))
            }
            StoreCommand::DelIfEq { key, value } => {
                let matches = match self.live(key) {
                    None => false,
                    Some(Entry {
                        value: StoredValue::Str(current),
                        ..
                    }) => current == value,
                    Some(_) => return Err(wrong_type(key)),
                };
                if matches {
                    self.entries.remove(key);
                }
                StoreReply::Int(i64::from(matches))
            }
            StoreCommand::ExpireIfEq { key, value, ttl } => {
                let now = self.now;
                match self.live(key) {
                    Some(Entry {
                        value: StoredValue::Str(current),
                        expires_at,
                    }) if current == value => {
                        *expires_at = Some(now + *ttl);
                        StoreReply::Int(1)
                    }
                    Some(Entry {
                        value: StoredValue::Str(_),
                        ..
                    })
                    | None => StoreReply::Int(0),
                    Some(_) => return Err(wrong_type(key)),
                }
            }
            StoreCommand::Exists { key } => StoreReply::Int(i64::from(self.live(key).is_some())),
            StoreCommand::Expire { key, ttl } => {
                let now = self.now;
                match self.live(key) {
                    Some(entry) => {
                        entry.expires_at = Some(now + *ttl);
                        StoreReply::Int(1)
                    }
                    None => StoreReply::Int(0),
                }
            }
            StoreCommand::IncrBy { key, delta } => {
                let current = match self.live(key) {
                    None => 0,
                    Some(Entry {
                        value: StoredValue::Str(value),
                        ..
                    }) => value.parse::<i64>().map_err(|_| not_integer(key))?,
                    Some(_) => return Err(wrong_type(key)),
                };
                let next = current
                    .checked_add(*delta)
                    .ok_or_else(|| not_integer(key))?;
                let expires_at = self.entries.get(key).and_then(|entry| entry.expires_at);
                self.entries.insert(
                    key.clone(),
                    Entry {
                        value: StoredValue::Str(next.to_string()),
                        expires_at,
                    },
                );
                StoreReply::Int(next)
            }
            StoreCommand::LPush { key, values } => {
                let list = self.list_mut(key)?;
                for value in values {
                    list.push_front(value.clone());
                }
                StoreReply::Int(list.len() as i64)
            }
            StoreCommand::RPush { key, values } => {
                let list = self.list_mut(key)?;
                list.extend(values.iter().cloned());
                StoreReply::Int(list.len() as i64)
            }
            StoreCommand::LPop { key } => {
                let popped = match self.live(key) {
                    None => None,
                    Some(Entry {
                        value: StoredValue::List(list),
                        ..
                    }) => list.pop_front(),
                    Some(_) => return Err(wrong_type(key)),
                };
                self.remove_if_empty(key);
                popped.map(StoreReply::Value).unwrap_or(StoreReply::Nil)
            }
            StoreCommand::LLen { key } => match self.live(key) {
                None => StoreReply::Int(0),
                Some(Entry {
                    value: StoredValue::List(list),
                    ..
                }) => StoreReply::Int(list.len() as i64),
                Some(_) => return Err(wrong_type(key)),
            },
            StoreCommand::LRange { key, start, stop } => match self.live(key) {
                None => StoreReply::Array(Vec::new()),
                Some(Entry {
                    value: StoredValue::List(list),
                    ..
                }) => {
                    let items = match normalize_range(list.len(), *start, *stop) {
                        Some((from, to)) => list.range(from..to).cloned().collect(),
                        None => Vec::new(),
                    };
                    StoreReply::Array(items)
                }
                Some(_) => return Err(wrong_type(key)),
            },
            StoreCommand::ZAdd { key, members } => {
                let set = self.zset_mut(key)?;
                let mut added = 0;
                for (score, member) in members {
                    if set.insert(member.clone(), *score).is_none() {
                        added += 1;
                    }
                }
                StoreReply::Int(added)
            }
            StoreCommand::ZRem { key, members } => {
                let removed = match self.live(key) {
                    None => 0,
                    Some(Entry {
                        value: StoredValue::ZSet(set),
                        ..
                    }) => members
                        .iter()
                        .filter(|member| set.remove(member.as_str()).is_some())
                        .count() as i64,
                    Some(_) => return Err(wrong_type(key)),
                };
                self.remove_if_empty(key);
                StoreReply::Int(removed)
            }
            StoreCommand::ZCard { key } => match self.live(key) {
                None => StoreReply::Int(0),
                Some(Entry {
                    value: StoredValue::ZSet(set),
                    ..
                }) => StoreReply::Int(set.len() as i64),
                Some(_) => return Err(wrong_type(key)),
            },
            StoreCommand::ZRangeByScore {
                key,
                min,
                max,
                offset,
                count,
            } => match self.live(key) {
                None => StoreReply::Array(Vec::new()),
                Some(Entry {
                    value: StoredValue::ZSet(set),
                    ..
                }) => {
                    let items = sorted_members(set)
                        .into_iter()
                        .filter(|(_, score)| *score >= *min && *score <= *max)
                        .skip(*offset)
                        .take(count.unwrap_or(usize::MAX))
                        .map(|(member, _)| member.clone())
                        .collect();
                    StoreReply::Array(items)
                }
                Some(_) => return Err(wrong_type(key)),
            },
            StoreCommand::ZRange { key, start, stop } => match self.live(key) {
                None => StoreReply::Array(Vec::new()),
                Some(Entry {
                    value: StoredValue::ZSet(set),
                    ..
                }) => {
                    let members = sorted_members(set);
                    let items = match normalize_range(members.len(), *start, *stop) {
                        Some((from, to)) => members[from..to]
                            .iter()
                            .map(|(member, _)| (*member).clone())
                            .collect(),
                        None => Vec::new(),
                    };
                    StoreReply::Array(items)
                }
                Some(_) => return Err(wrong_type(key)),
            },
            StoreCommand::HSet { key, fields } => {
                let hash = self.hash_mut(key)?;
                let mut added = 0;
                for (field, value) in fields {
                    if hash.insert(field.clone(), value.clone()).is_none() {
                        added += 1;
                    }
                }
                StoreReply::Int(added)
            }
            StoreCommand::HGet { key, field } => match self.live(key) {
                None => StoreReply::Nil,
                Some(Entry {
                    value: StoredValue::Hash(hash),
                    ..
                }) => hash
                    .get(field)
                    .cloned()
                    .map(StoreReply::Value)
                    .unwrap_or(StoreReply::Nil),
                Some(_) => return Err(wrong_type(key)),
            },
            StoreCommand::HGetAll { key } => match self.live(key) {
                None => StoreReply::Map(HashMap::new()),
                Some(Entry {
                    value: StoredValue::Hash(hash),
                    ..
                }) => StoreReply::Map(hash.clone()),
                Some(_) => return Err(wrong_type(key)),
            },
            StoreCommand::HIncrBy { key, field, delta } => {
                let hash = self.hash_mut(key)?;
                let current = match hash.get(field) {
                    Some(value) => value.parse::<i64>().map_err(|_| not_integer(key))?,
                    None => 0,
                };
                let next = current + *delta;
                hash.insert(field.clone(), next.to_string());
                StoreReply::Int(next)
            }
        };
        Ok(reply)
    }
}

impl InMemoryCoordinationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 键的剩余存活时间，键不存在或没有设置过期时返回 None
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.state.lock().await;
        entries
            .get(key)
            .and_then(|entry| entry.expires_at)
            .filter(|at| *at > now)
            .map(|at| at - now)
    }

    /// 当前存活的键数量
    pub async fn key_count(&self) -> usize {
        let now = Instant::now();
        let entries = self.state.lock().await;
        entries
            .values()
            .filter(|entry| entry.expires_at.is_none_or(|at| at > now))
            .count()
    }
}

#[async_trait]
impl CoordinationStore for InMemoryCoordinationStore {
    async fn exec(&self, batch: StoreBatch) -> SchedulerResult<Vec<StoreReply>> {
        let mut entries = self.state.lock().await;
        let mut state = StoreState {
            entries: &mut *entries,
            now: Instant::now(),
        };
        batch
            .commands()
            .iter()
            .map(|command| state.apply(command))
            .collect()
    }

    async fn ping(&self) -> SchedulerResult<()> {
        Ok(())
    }
}
