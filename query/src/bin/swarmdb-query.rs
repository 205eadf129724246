// Copyright 2022 Swarmdb Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::Arc;
use std::time::Duration;

use common_base::Stoppable;
use common_flight_rpc::exec::client_to_coordinator_server::ClientToCoordinatorServer;
use common_flight_rpc::exec::coordinator_to_worker_server::CoordinatorToWorkerServer;
use common_flight_rpc::exec::worker_to_coordinator_server::WorkerToCoordinatorServer;
use common_flight_rpc::ConnectionPool;
use metrics_exporter_prometheus::PrometheusBuilder;
use scheduler::NoopReservationBroker;
use scheduler::Scheduler;
use swarmdb_query::rpc::ClientService;
use swarmdb_query::rpc::CoordinatorService;
use swarmdb_query::rpc::QueryRegistry;
use swarmdb_query::rpc::ResultChannelRegistry;
use swarmdb_query::rpc::WorkerService;
use swarmdb_query::Config;
use swarmdb_query::CounterThread;
use swarmdb_query::RuntimeEnv;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let metrics_listen: std::net::SocketAddr = config.metrics_listen.parse()?;
    PrometheusBuilder::new().listen_address(metrics_listen).install()?;

    let runtime = RuntimeEnv::create(config.clone());

    let mut counter_thread = CounterThread::create(runtime.clone(), Duration::from_millis(config.counter_sample_interval_ms));
    counter_thread.start().await?;

    let connection_pool = ConnectionPool::create();
    let result_registry = Arc::new(ResultChannelRegistry::create());
    let query_registry = QueryRegistry::create();
    let scheduler = Arc::new(Scheduler::create(Arc::new(NoopReservationBroker), config.mem_limit_bytes.max(0)));

    let worker_service = WorkerService::create(
        config.worker_address.clone(),
        runtime.memory_tracker_root.clone(),
        runtime.exchange_manager.clone(),
        result_registry.clone(),
        connection_pool.clone(),
        config.batch_size,
        1 << 26,
        config.exchange_receive_buffer_bytes,
        Duration::from_secs(30),
        Duration::from_millis(config.status_report_interval_ms),
    );

    let coordinator_service = CoordinatorService::create(query_registry.clone());

    let client_service = ClientService::create(
        config.worker_address.clone(),
        runtime.memory_tracker_root.clone(),
        scheduler,
        connection_pool,
        result_registry,
        query_registry,
        config.worker_to_coordinator_listen.clone(),
        config.mem_limit_bytes,
        Duration::from_secs(config.idle_query_timeout_s),
        Duration::from_millis(200),
        1 << 26,
    );

    let coordinator_to_worker_listen: std::net::SocketAddr = config.coordinator_to_worker_listen.parse()?;
    let worker_to_coordinator_listen: std::net::SocketAddr = config.worker_to_coordinator_listen.parse()?;
    let client_to_coordinator_listen: std::net::SocketAddr = config.client_to_coordinator_listen.parse()?;

    tracing::info!(
        worker = %coordinator_to_worker_listen,
        coordinator = %worker_to_coordinator_listen,
        client = %client_to_coordinator_listen,
        "starting swarmdb-query"
    );

    let worker_server = tonic::transport::Server::builder()
        .add_service(CoordinatorToWorkerServer::new(worker_service))
        .serve(coordinator_to_worker_listen);

    let coordinator_server = tonic::transport::Server::builder()
        .add_service(WorkerToCoordinatorServer::new(coordinator_service))
        .serve(worker_to_coordinator_listen);

    let client_server = tonic::transport::Server::builder()
        .add_service(ClientToCoordinatorServer::new(client_service))
        .serve(client_to_coordinator_listen);

    tokio::try_join!(worker_server, coordinator_server, client_server)?;

    counter_thread.stop(false).await?;
    Ok(())
}
