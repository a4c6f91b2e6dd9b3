// 该文件是 Huojia （货架巡检） 项目的一部分。
// src/bin/audit.rs - 货架巡检命令行工具
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use huojia::engine::{
  AnalysisOptions, AnalysisResult, DetectionSource, PassStats, analyze_consensus,
};
use huojia::layout::{Layout, looks_top_first, sanitize_layout};
use huojia::InferenceResponse;

/// Huojia 巡检参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 计划布局（棚割表）JSON 文件路径
  #[arg(long, value_name = "FILE")]
  pub planogram: PathBuf,
  /// 检测结果 JSON 文件路径，可重复指定做多趟共识分析
  #[arg(long, value_name = "FILE", required = true)]
  pub detections: Vec<PathBuf>,
  /// 最低置信度
  #[arg(long, default_value_t = 0.4)]
  pub confidence: f32,
  /// 货架层聚类阈值（像素）
  #[arg(long, default_value_t = 100_000.0)]
  pub shelf_threshold: f32,
  /// 空位阈值中标准差的倍数
  #[arg(long, default_value_t = 1.5)]
  pub empty_multiplier: f32,
  /// 单个间隙最多插入的 EMPTY 数量
  #[arg(long, default_value_t = 3)]
  pub max_empty: usize,
  /// 计划布局按“最高层在前”书写，读入后翻转为底层在前
  #[arg(long)]
  pub top_first: bool,
  /// 报告输出路径，缺省打印到标准输出
  #[arg(long, value_name = "FILE")]
  pub output: Option<PathBuf>,
}

/// 读取检测文件时的错误
#[derive(Debug, Error)]
enum LoadError {
  #[error("读取检测文件失败: {0}")]
  Io(#[from] std::io::Error),
  #[error("解析检测文件失败: {0}")]
  Json(#[from] serde_json::Error),
}

/// 以落盘 JSON 文件为来源的检测趟次
struct FileSource {
  name: String,
  path: PathBuf,
}

impl FileSource {
  fn new(path: PathBuf) -> Self {
    FileSource {
      name: path.display().to_string(),
      path,
    }
  }
}

impl DetectionSource for FileSource {
  type Error = LoadError;

  fn name(&self) -> &str {
    &self.name
  }

  fn detect(&self) -> Result<InferenceResponse, Self::Error> {
    let text = fs::read_to_string(&self.path)?;
    Ok(serde_json::from_str(&text)?)
  }
}

/// 巡检报告
#[derive(Debug, Serialize)]
struct Report {
  /// 报告生成时间
  generated_at: DateTime<Utc>,
  /// 计划布局文件
  planogram: String,
  /// 参与共识的检测趟数
  passes: usize,
  /// 逐趟统计
  pass_stats: Vec<PassStats>,
  #[serde(flatten)]
  result: AnalysisResult,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("计划布局: {}", args.planogram.display());
  info!("检测趟数: {}", args.detections.len());

  let raw: Layout = serde_json::from_str(&fs::read_to_string(&args.planogram)?)?;
  let mut planogram = sanitize_layout(&raw);
  if args.top_first {
    planogram.reverse();
  } else if looks_top_first(&planogram) {
    warn!("计划布局疑似最高层在前，如确认请加 --top-first 翻转");
  }

  let options = AnalysisOptions::default()
    .with_confidence(args.confidence)
    .with_shelf_threshold(args.shelf_threshold)
    .with_empty_threshold_multiplier(args.empty_multiplier)
    .with_max_empty_per_gap(args.max_empty);

  let sources: Vec<FileSource> = args.detections.into_iter().map(FileSource::new).collect();

  let (result, consensus) = analyze_consensus(&sources, &planogram, &options)?;

  info!(
    "共识合并: {} 趟，{} 个合并框",
    consensus.passes(),
    consensus.merged_boxes.len()
  );
  for stats in &consensus.pass_stats {
    info!(
      "趟次 {}: {} 处差异，符合度 {:.1}%",
      stats.name, stats.discrepancy_count, stats.similarity_score
    );
  }

  let product_kinds: HashSet<&str> = result.movements.iter().map(|m| m.product()).collect();
  info!(
    "纠正动作: {} 个，涉及 {} 种商品",
    result.movements.len(),
    product_kinds.len()
  );

  let report = Report {
    generated_at: Utc::now(),
    planogram: args.planogram.display().to_string(),
    passes: consensus.passes(),
    pass_stats: consensus.pass_stats,
    result,
  };

  let json = serde_json::to_string_pretty(&report)?;
  match &args.output {
    Some(path) => {
      fs::write(path, &json)?;
      info!("报告已写入: {}", path.display());
    }
    None => println!("{json}"),
  }

  Ok(())
}
