use serde::{Deserialize, Serialize};

/// 资源组记录
///
/// 配额是相对权重，必须为正数；调度时按配额比例随机选择资源组。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceGroupRecord {
    pub id: u32,
    pub name: String,
    pub quota: f64,
    #[serde(default)]
    pub description: String,
}

impl ResourceGroupRecord {
    pub fn new(id: u32, name: impl Into<String>, quota: f64) -> Self {
        Self {
            id,
            name: name.into(),
            quota,
            description: String::new(),
        }
    }

    /// 配额是否可用于选择
    pub fn has_valid_quota(&self) -> bool {
        self.quota.is_finite() && self.quota > 0.0
    }
}

/// 内置的默认资源组
pub fn default_resource_groups() -> Vec<ResourceGroupRecord> {
    vec![
        ResourceGroupRecord {
            id: 2,
            name: "1".to_string(),
            quota: 0.6,
            description: "默认资源组1".to_string(),
        },
        ResourceGroupRecord {
            id: 3,
            name: "2".to_string(),
            quota: 0.4,
            description: "默认资源组2".to_string(),
        },
    ]
}
