use pretty_assertions::assert_eq;

use ccl_pass::{
    BlobDesc, CollectiveKind, DeviceType, InsertCollectiveOpsPass, Job, JobBuilder, OpGraph, OperatorConf,
    OperatorDesc, PassConfig, Placement, Sbp, SkipReason,
};

fn pass() -> InsertCollectiveOpsPass {
    InsertCollectiveOpsPass::new(PassConfig::enabled(2708))
}

fn producer(name: &str, sbp: Sbp, shape: &[i64]) -> OperatorDesc {
    OperatorDesc::new(OperatorConf::new(name, "matmul").with_output("out_0"))
        .with_sbp("out_0", sbp)
        .with_blob_desc("out_0", BlobDesc::new(shape.iter().copied()))
}

fn consumer(name: &str, inputs: &[(&str, Sbp)]) -> OperatorDesc {
    let mut desc = producer(name, Sbp::Broadcast, &[8, 4]);
    for (i, (input, sbp)) in inputs.iter().enumerate() {
        desc.conf = desc.conf.with_input(format!("in_{i}"), format!("{input}/out_0"));
        desc = desc.with_sbp(format!("in_{i}"), *sbp);
    }
    desc
}

fn job(placement: &Placement, ops: Vec<OperatorDesc>) -> Job {
    let mut job = Job { name: "test".to_string(), ..Default::default() };
    for op in ops {
        job.push_op(placement, op);
    }
    job
}

fn single_edge_job(src: Sbp, dst: Sbp, parallel_num: usize) -> Job {
    job(&Placement::on_machine(DeviceType::Gpu, parallel_num), vec![
        producer("a", src, &[8, 4]),
        consumer("b", &[("a", dst)]),
    ])
}

fn collective_ops(job: &Job) -> Vec<&OperatorDesc> {
    job.ops.iter().filter(|op| op.conf.op_type_name.starts_with("_ccl_logical_op_")).collect()
}

#[test]
fn test_noop_without_eligible_subgraph() {
    let cpu = Placement::on_machine(DeviceType::Cpu, 4);
    let single = Placement::on_machine(DeviceType::Gpu, 1);

    for placement in [cpu, single] {
        let mut job = job(&placement, vec![producer("a", Sbp::PartialSum, &[8, 4]), consumer("b", &[("a", Sbp::Broadcast)])]);
        let before = job.clone();
        let report = pass().apply(&mut job).unwrap();
        assert!(report.is_noop());
        assert_eq!(job, before);
    }

    // eligible ops, but no two of them are connected
    let gpu = Placement::on_machine(DeviceType::Gpu, 4);
    let mut job = job(&gpu, vec![producer("a", Sbp::PartialSum, &[8, 4]), producer("b", Sbp::PartialSum, &[8, 4])]);
    let before = job.clone();
    assert!(pass().apply(&mut job).unwrap().is_noop());
    assert_eq!(job, before);
}

#[test]
fn test_disabled_pass_is_noop() {
    let mut job = single_edge_job(Sbp::PartialSum, Sbp::Broadcast, 4);
    let before = job.clone();

    let report = InsertCollectiveOpsPass::new(PassConfig::default()).apply(&mut job).unwrap();
    assert!(report.is_noop());
    let report = InsertCollectiveOpsPass::new(PassConfig::enabled(2600)).apply(&mut job).unwrap();
    assert!(report.is_noop());
    assert_eq!(job, before);
}

#[test]
fn test_partial_sum_to_broadcast_inserts_all_reduce() {
    let gpu = Placement::on_machine(DeviceType::Gpu, 4);
    let mut job = job(&gpu, vec![
        producer("a", Sbp::PartialSum, &[8, 4]),
        consumer("b", &[("a", Sbp::Broadcast)]),
        consumer("c", &[("b", Sbp::Broadcast)]),
    ]);
    let before = job.clone();

    let report = pass().apply(&mut job).unwrap();
    assert_eq!(report.inserted.len(), 1);
    assert_eq!(report.mutated, vec!["b".to_string()]);

    let collectives = collective_ops(&job);
    assert_eq!(collectives.len(), 1);
    let all_reduce = collectives[0];
    assert_eq!(all_reduce.conf.op_type_name, CollectiveKind::AllReduce.op_type_name());
    assert!(all_reduce.name().starts_with("System-CCL-Logical-Op-P2B-"));
    assert_eq!(all_reduce.conf.inputs["in_0"], "a/out_0");
    assert_eq!(job.placement_of(all_reduce.name()), Some(&gpu));

    let b = job.op("b").unwrap();
    assert_eq!(b.conf.inputs["in_0"], all_reduce.conf.output_lbn("out_0"));
    assert!(b.conf.ctrl_in_op_names.is_empty());

    // nothing else moved
    assert_eq!(job.op("a"), before.op("a"));
    assert_eq!(job.op("c"), before.op("c"));
    assert_eq!(job.ops.len(), before.ops.len() + 1);
}

#[test]
fn test_partial_sum_to_split_needs_divisible_dim() {
    let mut job = single_edge_job(Sbp::PartialSum, Sbp::Split(0), 4);
    let report = pass().apply(&mut job).unwrap();
    assert_eq!(report.inserted.len(), 1);
    assert_eq!(collective_ops(&job)[0].conf.op_type_name, CollectiveKind::ReduceScatter.op_type_name());

    let mut job = single_edge_job(Sbp::PartialSum, Sbp::Split(0), 3);
    let before = job.clone();
    let report = pass().apply(&mut job).unwrap();
    assert!(report.is_noop());
    assert_eq!(report.unresolved.len(), 1);
    assert_eq!(job, before);
}

#[test]
fn test_split_to_broadcast_inserts_all_gather() {
    let mut job = single_edge_job(Sbp::Split(0), Sbp::Broadcast, 4);
    let report = pass().apply(&mut job).unwrap();
    assert_eq!(report.inserted.len(), 1);
    assert_eq!(report.inserted[0].kind, CollectiveKind::AllGather);
    assert_eq!(collective_ops(&job)[0].conf.op_type_name, CollectiveKind::AllGather.op_type_name());
}

#[test]
fn test_split_to_other_split_is_left_unresolved() {
    let mut job = single_edge_job(Sbp::Split(0), Sbp::Split(1), 4);
    let before = job.clone();

    for _ in 0..2 {
        let report = pass().apply(&mut job).unwrap();
        assert!(report.is_noop());
        assert_eq!(report.unresolved.len(), 1);
        assert_eq!(report.unresolved[0].reason, SkipReason::Unimplemented(CollectiveKind::AllToAll));
        assert_eq!(job, before);
    }
    assert_eq!(job.op("b").unwrap().conf.inputs["in_0"], "a/out_0");
}

#[test]
fn test_dynamic_shape_is_left_unchanged() {
    let gpu = Placement::on_machine(DeviceType::Gpu, 4);
    let mut a = producer("a", Sbp::PartialSum, &[8, 4]);
    a.blob_descs.insert("out_0".to_string(), BlobDesc::dynamic([8, 4]));
    let mut job = job(&gpu, vec![a, consumer("b", &[("a", Sbp::Broadcast)])]);
    let before = job.clone();

    let report = pass().apply(&mut job).unwrap();
    assert_eq!(report.unresolved[0].reason, SkipReason::DynamicShape);
    assert_eq!(job, before);
}

#[test]
fn test_malformed_shape_aborts() {
    let gpu = Placement::on_machine(DeviceType::Gpu, 4);
    let mut job = job(&gpu, vec![producer("a", Sbp::PartialSum, &[0, 4]), consumer("b", &[("a", Sbp::Broadcast)])]);
    let before = job.clone();

    assert!(matches!(pass().apply(&mut job), Err(ccl_pass::Error::MalformedShape { .. })));
    assert_eq!(job, before);
}

#[test]
fn test_execution_order_is_serialized() {
    // a fans out to b and c, d reads b, e reads c
    let gpu = Placement::on_machine(DeviceType::Gpu, 4);
    let mut job = job(&gpu, vec![
        producer("a", Sbp::PartialSum, &[8, 4]),
        consumer("b", &[("a", Sbp::Broadcast)]),
        consumer("c", &[("a", Sbp::Broadcast)]),
        consumer("d", &[("b", Sbp::Broadcast)]),
        consumer("e", &[("c", Sbp::Broadcast)]),
    ]);

    let report = pass().apply(&mut job).unwrap();
    assert_eq!(report.subgraph, vec!["a", "b", "c", "d", "e"]);
    assert_eq!(report.ctrl_edges, vec![
        ("b".to_string(), "c".to_string()),
        ("c".to_string(), "d".to_string()),
        ("d".to_string(), "e".to_string()),
    ]);
    assert_eq!(report.inserted.len(), 2);

    let graph = OpGraph::new(&job).unwrap();
    let reachability = graph.reachability();
    for pair in report.subgraph.windows(2) {
        assert!(reachability.is_reachable(&pair[0], &pair[1]), "{} -> {}", pair[0], pair[1]);
    }
    for pair in report.inserted.windows(2) {
        assert!(reachability.is_reachable(&pair[0].name, &pair[1].name));
    }

    // the collective feeding c runs before b, which directly follows a
    assert!(reachability.is_reachable(&report.inserted[1].name, "b"));
}

#[test]
fn test_second_invocation_is_noop() {
    let gpu = Placement::on_machine(DeviceType::Gpu, 4);
    let mut job = job(&gpu, vec![
        producer("a", Sbp::PartialSum, &[8, 4]),
        consumer("b", &[("a", Sbp::Broadcast)]),
        consumer("c", &[("a", Sbp::Broadcast), ("b", Sbp::Broadcast)]),
    ]);

    let report = pass().apply(&mut job).unwrap();
    assert_eq!(report.inserted.len(), 2);
    let rewritten = job.clone();

    let report = pass().apply(&mut job).unwrap();
    assert!(report.is_noop());
    assert_eq!(job, rewritten);
}

#[test]
fn test_largest_subgraph_wins() {
    let gpu = Placement::on_machine(DeviceType::Gpu, 4);
    let other = Placement::new(DeviceType::Gpu, (4..8).map(|index| ccl_pass::Device { machine: 0, index }));
    let mut job = job(&gpu, vec![
        producer("a", Sbp::PartialSum, &[8, 4]),
        consumer("b", &[("a", Sbp::Broadcast)]),
    ]);
    job.push_op(&other, producer("x", Sbp::PartialSum, &[8, 4]));
    job.push_op(&other, consumer("y", &[("x", Sbp::Broadcast)]));
    job.push_op(&other, consumer("z", &[("y", Sbp::Broadcast)]));

    let report = pass().apply(&mut job).unwrap();
    assert_eq!(report.subgraph, vec!["x", "y", "z"]);
    assert_eq!(report.inserted[0].producer, "x");
    assert_eq!(job.placement_of(&report.inserted[0].name), Some(&other));
    assert_eq!(job.op("b").unwrap().conf.inputs["in_0"], "a/out_0");
}

#[test]
fn test_apply_to_sink_leaves_source_job_untouched() {
    let job = single_edge_job(Sbp::PartialSum, Sbp::Broadcast, 4);
    let mut target = job.clone();

    let report = pass().apply_to_sink(&job, &mut JobBuilder::new(&mut target)).unwrap();
    assert_eq!(report.inserted.len(), 1);
    assert_eq!(target.ops.len(), job.ops.len() + 1);
    assert_eq!(job, single_edge_job(Sbp::PartialSum, Sbp::Broadcast, 4));
}

#[test]
fn test_demo_job() {
    let dir = concat!(env!("CARGO_MANIFEST_DIR"), "/demos");
    let mut job = Job::from_json_file(format!("{dir}/job.json")).unwrap();
    let config = PassConfig::from_json_file(format!("{dir}/config.json")).unwrap();

    let report = InsertCollectiveOpsPass::new(config).apply(&mut job).unwrap();
    let kinds: Vec<_> = report.inserted.iter().map(|x| x.kind).collect();
    assert_eq!(kinds, vec![CollectiveKind::AllReduce, CollectiveKind::ReduceScatter, CollectiveKind::AllGather]);
    assert_eq!(report.ctrl_edges, vec![("relu".to_string(), "softmax".to_string())]);

    let text = serde_json::to_string(&job).unwrap();
    let reloaded: Job = serde_json::from_str(&text).unwrap();
    assert_eq!(reloaded, job);
    assert!(OpGraph::new(&reloaded).is_ok());
}

#[test]
fn test_repeated_runs_reach_every_region() {
    let gpu = Placement::on_machine(DeviceType::Gpu, 4);
    let other = Placement::new(DeviceType::Gpu, (4..8).map(|index| ccl_pass::Device { machine: 0, index }));
    let mut job = job(&gpu, vec![
        producer("a", Sbp::PartialSum, &[8, 4]),
        consumer("b", &[("a", Sbp::Broadcast)]),
        consumer("b2", &[("b", Sbp::Broadcast)]),
    ]);
    job.push_op(&other, producer("x", Sbp::PartialSum, &[8, 4]));
    job.push_op(&other, consumer("y", &[("x", Sbp::Broadcast)]));

    let report = pass().apply(&mut job).unwrap();
    assert_eq!(report.subgraph, vec!["a", "b", "b2"]);
    assert_eq!(report.inserted.len(), 1);

    let report = pass().apply(&mut job).unwrap();
    assert_eq!(report.subgraph, vec!["x", "y"]);
    assert_eq!(report.inserted.len(), 1);
    assert_eq!(job.op("y").unwrap().conf.inputs["in_0"], job.op(&report.inserted[0].name).unwrap().conf.output_lbn("out_0"));
    assert_eq!(job.placement_of(&report.inserted[0].name), Some(&other));
    assert_eq!(collective_ops(&job).len(), 2);

    let rewritten = job.clone();
    let report = pass().apply(&mut job).unwrap();
    assert!(report.is_noop());
    assert_eq!(job, rewritten);
}

#[test]
fn test_generated_names_avoid_existing_ops() {
    let gpu = Placement::on_machine(DeviceType::Gpu, 4);
    let cpu = Placement::on_machine(DeviceType::Cpu, 1);
    let mut job = single_edge_job(Sbp::PartialSum, Sbp::Broadcast, 4);
    job.push_op(&cpu, producer("System-CCL-Logical-Op-P2B-0", Sbp::Broadcast, &[8, 4]));
    job.push_op(&cpu, producer("System-CCL-Logical-Op-P2B-1", Sbp::Broadcast, &[8, 4]));

    let report = pass().apply(&mut job).unwrap();
    assert_eq!(report.inserted[0].name, "System-CCL-Logical-Op-P2B-2");
    assert_eq!(job.placement_of("System-CCL-Logical-Op-P2B-2"), Some(&gpu));
    assert_eq!(job.placement_of("System-CCL-Logical-Op-P2B-0"), Some(&cpu));
}

#[test]
fn test_every_blob_on_an_edge_gets_its_own_collective() {
    // b reads a/out_0 through two slots and a/out_1 through a third
    let gpu = Placement::on_machine(DeviceType::Gpu, 4);
    let a = OperatorDesc::new(OperatorConf::new("a", "matmul").with_output("out_0").with_output("out_1"))
        .with_sbp("out_0", Sbp::PartialSum)
        .with_sbp("out_1", Sbp::Split(0))
        .with_blob_desc("out_0", BlobDesc::new([8, 4]))
        .with_blob_desc("out_1", BlobDesc::new([8, 4]));
    let b = OperatorDesc::new(OperatorConf::new("b", "add")
            .with_input("in_0", "a/out_0")
            .with_input("in_1", "a/out_0")
            .with_input("in_2", "a/out_1")
            .with_output("out_0"))
        .with_sbp("in_0", Sbp::Broadcast)
        .with_sbp("in_1", Sbp::Broadcast)
        .with_sbp("in_2", Sbp::Broadcast)
        .with_sbp("out_0", Sbp::Broadcast)
        .with_blob_desc("out_0", BlobDesc::new([8, 4]));
    let mut job = job(&gpu, vec![a, b]);

    let report = pass().apply(&mut job).unwrap();
    let kinds: Vec<_> = report.inserted.iter().map(|x| x.kind).collect();
    assert_eq!(kinds, vec![CollectiveKind::AllReduce, CollectiveKind::AllGather]);
    assert_eq!(report.inserted[0].lbn, "a/out_0");
    assert_eq!(report.inserted[1].lbn, "a/out_1");

    let (all_reduce, all_gather) = (job.op(&report.inserted[0].name).unwrap(), job.op(&report.inserted[1].name).unwrap());
    assert_eq!(all_gather.conf.ctrl_in_op_names, vec![all_reduce.name().to_string()]);

    let b = job.op("b").unwrap();
    assert_eq!(b.conf.inputs["in_0"], all_reduce.conf.output_lbn("out_0"));
    assert_eq!(b.conf.inputs["in_1"], all_reduce.conf.output_lbn("out_0"));
    assert_eq!(b.conf.inputs["in_2"], all_gather.conf.output_lbn("out_0"));
    assert_eq!(report.mutated, vec!["b".to_string()]);
}
