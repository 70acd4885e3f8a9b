use std::collections::HashMap;

use dtf_core::{SchedulerError, SchedulerResult, StoreCommand, StoreReply};
use redis::{Cmd, Value};

/// 分数参数，无界分数转换为 Redis 的 `-inf`/`+inf`
pub(crate) fn score_arg(score: f64) -> String {
    if score == f64::NEG_INFINITY {
        "-inf".to_string()
    } else if score == f64::INFINITY {
        "+inf".to_string()
    } else {
        score.to_string()
    }
}

/// 值相等时删除
const DEL_IF_EQ_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

/// 值相等时重设过期时间
const EXPIRE_IF_EQ_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("PEXPIRE", KEYS[1], ARGV[2])
end
return 0
"#;

/// 将存储命令转换为 Redis 命令
pub(crate) fn to_redis_cmd(command: &StoreCommand) -> Cmd {
    match command {
        StoreCommand::Get { key } => {
            let mut cmd = redis::cmd("GET");
            cmd.arg(key);
            cmd
        }
        StoreCommand::Set { key, value, ttl } => {
            let mut cmd = redis::cmd("SET");
            cmd.arg(key).arg(value);
            if let Some(ttl) = ttl {
                cmd.arg("PX").arg(ttl.as_millis() as u64);
            }
            cmd
        }
        StoreCommand::SetNx { key, value, ttl } => {
            let mut cmd = redis::cmd("SET");
            cmd.arg(key).arg(value).arg("NX");
            if let Some(ttl) = ttl {
                cmd.arg("PX").arg(ttl.as_millis() as u64);
            }
            cmd
        }
        StoreCommand::Del { key } => {
            let mut cmd = redis::cmd("DEL");
            cmd.arg(key);
            cmd
        }
        StoreCommand::DelIfEq { key, value } => {
            let mut cmd = redis::cmd("EVAL");
            cmd.arg(DEL_IF_EQ_SCRIPT).arg(1).arg(key).arg(value);
            cmd
        }
        StoreCommand::ExpireIfEq { key, value, ttl } => {
            let mut cmd = redis::cmd("EVAL");
            cmd.arg(EXPIRE_IF_EQ_SCRIPT)
                .arg(1)
                .arg(key)
                .arg(value)
                .arg(ttl.as_millis() as u64);
            cmd
        }
        StoreCommand::Exists { key } => {
            let mut cmd = redis::cmd("EXISTS");
            cmd.arg(key);
            cmd
        }
        StoreCommand::Expire { key, ttl } => {
            let mut cmd = redis::cmd("PEXPIRE");
            cmd.arg(key).arg(ttl.as_millis() as u64);
            cmd
        }
        StoreCommand::IncrBy { key, delta } => {
            let mut cmd = redis::cmd("INCRBY");
            cmd.arg(key).arg(*delta);
            cmd
        }
        StoreCommand::LPush { key, values } => {
            let mut cmd = redis::cmd("LPUSH");
            cmd.arg(key).arg(values);
            cmd
        }
        StoreCommand::RPush { key, values } => {
            let mut cmd = redis::cmd("RPUSH");
            cmd.arg(key).arg(values);
            cmd
        }
        StoreCommand::LPop { key } => {
            let mut cmd = redis::cmd("LPOP");
            cmd.arg(key);
            cmd
        }
        StoreCommand::LLen { key } => {
            let mut cmd = redis::cmd("LLEN");
            cmd.arg(key);
            cmd
        }
        StoreCommand::LRange { key, start, stop } => {
            let mut cmd = redis::cmd("LRANGE");
            cmd.arg(key).arg(*start).arg(*stop);
            cmd
        }
        StoreCommand::ZAdd { key, members } => {
            let mut cmd = redis::cmd("ZADD");
            cmd.arg(key);
            for (score, member) in members {
                cmd.arg(score_arg(*score)).arg(member);
            }
            cmd
        }
        StoreCommand::ZRem { key, members } => {
            let mut cmd = redis::cmd("ZREM");
            cmd.arg(key).arg(members);
            cmd
        }
        StoreCommand::ZCard { key } => {
            let mut cmd = redis::cmd("ZCARD");
            cmd.arg(key);
            cmd
        }
        StoreCommand::ZRangeByScore {
            key,
            min,
            max,
            offset,
            count,
        } => {
            let mut cmd = redis::cmd("ZRANGEBYSCORE");
            cmd.arg(key).arg(score_arg(*min)).arg(score_arg(*max));
            if let Some(count) = count {
                cmd.arg("LIMIT").arg(*offset).arg(*count);
            }
            cmd
        }
        StoreCommand::ZRange { key, start, stop } => {
            let mut cmd = redis::cmd("ZRANGE");
            cmd.arg(key).arg(*start).arg(*stop);
            cmd
        }
        StoreCommand::HSet { key, fields } => {
            let mut cmd = redis::cmd("HSET");
            cmd.arg(key);
            for (field, value) in fields {
                cmd.arg(field).arg(value);
            }
            cmd
        }
        StoreCommand::HGet { key, field } => {
            let mut cmd = redis::cmd("HGET");
            cmd.arg(key).arg(field);
            cmd
        }
        StoreCommand::HGetAll { key } => {
            let mut cmd = redis::cmd("HGETALL");
            cmd.arg(key);
            cmd
        }
        StoreCommand::HIncrBy { key, field, delta } => {
            let mut cmd = redis::cmd("HINCRBY");
            cmd.arg(key).arg(field).arg(*delta);
            cmd
        }
    }
}

fn reply_error(command: &StoreCommand, err: redis::RedisError) -> SchedulerError {
    SchedulerError::Store(format!("解析命令回复失败 {}: {err}", command.key()))
}

/// 按命令类型转换 Redis 回复
pub(crate) fn convert_reply(command: &StoreCommand, value: &Value) -> SchedulerResult<StoreReply> {
    let reply = match command {
        StoreCommand::Get { .. } | StoreCommand::LPop { .. } | StoreCommand::HGet { .. } => {
            let value: Option<String> =
                redis::from_redis_value(value).map_err(|e| reply_error(command, e))?;
            value.map(StoreReply::Value).unwrap_or(StoreReply::Nil)
        }
        StoreCommand::Set { .. } => StoreReply::Ok,
        StoreCommand::SetNx { .. } => {
            let value: Option<String> =
                redis::from_redis_value(value).map_err(|e| reply_error(command, e))?;
            StoreReply::Int(i64::from(value.is_some()))
        }
        StoreCommand::LRange { .. }
        | StoreCommand::ZRangeByScore { .. }
        | StoreCommand::ZRange { .. } => {
            let items: Vec<String> =
                redis::from_redis_value(value).map_err(|e| reply_error(command, e))?;
            StoreReply::Array(items)
        }
        StoreCommand::HGetAll { .. } => {
            let map: HashMap<String, String> =
                redis::from_redis_value(value).map_err(|e| reply_error(command, e))?;
            StoreReply::Map(map)
        }
        StoreCommand::Del { .. }
        | StoreCommand::DelIfEq { .. }
        | StoreCommand::ExpireIfEq { .. }
        | StoreCommand::Exists { .. }
        | StoreCommand::Expire { .. }
        | StoreCommand::IncrBy { .. }
        | StoreCommand::LPush { .. }
        | StoreCommand::RPush { .. }
        | StoreCommand::LLen { .. }
        | StoreCommand::ZAdd { .. }
        | StoreCommand::ZRem { .. }
        | StoreCommand::ZCard { .. }
        | StoreCommand::HSet { .. }
        | StoreCommand::HIncrBy { .. } => {
            let value: i64 = redis::from_redis_value(value).map_err(|e| reply_error(command, e))?;
            StoreReply::Int(value)
        }
    };
    Ok(reply)
}
