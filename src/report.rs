use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use crate::net::MarkingReport;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiringStep {
    pub step: usize,
    pub transition: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationReport {
    pub net: String,
    pub seed: Option<u64>,
    pub steps_requested: usize,
    pub fired: Vec<FiringStep>,
    /// 步数耗尽前可激发集为空
    pub deadlocked: bool,
    pub initial_marking: MarkingReport,
    pub final_marking: MarkingReport,
    pub elapsed: Duration,
}

impl SimulationReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// 将报告以 JSON 保存到文件中
    pub fn save_to_file<P: AsRef<Path>>(&self, file_path: P) -> std::io::Result<()> {
        let mut file = std::fs::File::create(file_path)?;
        let report = self.to_json()?;
        writeln!(file, "{}", report)
    }
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "模拟报告")?;
        writeln!(f, "网: {}", self.net)?;
        writeln!(f, "耗时: {:?}", self.elapsed)?;
        writeln!(
            f,
            "已发射: {} / {}",
            self.fired.len(),
            self.steps_requested
        )?;
        writeln!(f, "是否死锁: {}", self.deadlocked)?;

        writeln!(f, "\n最终标识:")?;
        for (place, row) in &self.final_marking.0 {
            for (token, count) in row {
                if *count > 0 {
                    writeln!(f, "  {}[{}]: {}", place, token, count)?;
                }
            }
        }
        Ok(())
    }
}
