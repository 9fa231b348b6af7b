use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use serde::Serialize;
use warp::http::{header, Response, StatusCode};
use warp::{Filter, Rejection, Reply};

use super::error::{handle_rejection, reject, ApiError};
use super::types::{filter_options, ApiResponse, Credentials, SubmissionRequest, SubmissionResponse};
use crate::auth::{AuthService, Session};
use crate::history::HistoryEngine;
use crate::report::{self, ChartSeries, CsvSink, Document, DocumentSink, PdfSink};
use crate::storage::{Observation, SortOrder};

pub const LIST_REPORT_TITLE: &str = "Health Guard - Patient Report";
pub const PROFILE_REPORT_TITLE: &str = "Health Guard - Patient Summary";

type Params = HashMap<String, String>;

pub struct RestApi {
    history: Arc<HistoryEngine>,
    auth: AuthService,
}

impl RestApi {
    pub fn new(history: Arc<HistoryEngine>, auth: AuthService) -> Self {
        RestApi { history, auth }
    }

    pub fn routes(&self) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
        self.register()
            .or(self.login())
            .or(self.logout())
            .or(self.predict())
            .or(self.history_list())
            .or(self.search())
            .or(self.chart_data())
            .or(self.export_csv())
            .or(self.export_pdf())
            .or(self.patient_chart_data())
            .or(self.patient_export_pdf())
            .or(self.patient_profile())
            .recover(handle_rejection)
            .with(warp::trace::request())
    }

    fn with_history(&self) -> impl Filter<Extract = (Arc<HistoryEngine>,), Error = Infallible> + Clone {
        let history = Arc::clone(&self.history);
        warp::any().map(move || Arc::clone(&history))
    }

    /// Resolves the `Authorization: Bearer <token>` header to a session.
    fn authenticated(&self) -> impl Filter<Extract = (Session,), Error = Rejection> + Clone {
        let auth = self.auth.clone();
        warp::header::optional::<String>("authorization").and_then(move |header: Option<String>| {
            let auth = auth.clone();
            async move {
                let token = header
                    .as_deref()
                    .and_then(|h| h.strip_prefix("Bearer "))
                    .map(str::trim)
                    .ok_or_else(|| reject(ApiError::Unauthorized))?;
                auth.authenticate(token).map_err(reject)
            }
        })
    }

    fn register(&self) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
        let auth = self.auth.clone();
        warp::path!("register")
            .and(warp::post())
            .and(warp::body::json())
            .and_then(move |credentials: Credentials| {
                let auth = auth.clone();
                async move {
                    let doctor = blocking(move || {
                        auth.register(&credentials.username, &credentials.password)
                    })
                    .await?;
                    Ok::<_, Rejection>(json_status(
                        StatusCode::CREATED,
                        ApiResponse::success("Doctor registered", to_value(&doctor)),
                    ))
                }
            })
    }

    fn login(&self) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
        let auth = self.auth.clone();
        warp::path!("login")
            .and(warp::post())
            .and(warp::body::json())
            .and_then(move |credentials: Credentials| {
                let auth = auth.clone();
                async move {
                    let session = blocking(move || {
                        auth.login(&credentials.username, &credentials.password)
                    })
                    .await?;
                    Ok::<_, Rejection>(warp::reply::json(&ApiResponse::success(
                        "Login successful",
                        to_value(&session),
                    )))
                }
            })
    }

    fn logout(&self) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
        let auth = self.auth.clone();
        warp::path!("logout")
            .and(warp::post())
            .and(self.authenticated())
            .and_then(move |session: Session| {
                let auth = auth.clone();
                async move {
                    auth.logout(&session.token).map_err(reject)?;
                    Ok::<_, Rejection>(warp::reply::json(&ApiResponse::success("Logged out", None)))
                }
            })
    }

    fn predict(&self) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
        warp::path!("predict")
            .and(warp::post())
            .and(self.authenticated())
            .and(warp::body::json())
            .and(self.with_history())
            .and_then(|session: Session, request: SubmissionRequest, history: Arc<HistoryEngine>| async move {
                tracing::debug!(doctor = %session.username, patient = %request.name, "submission");
                let stored = blocking(move || history.submit(request.into_draft())).await?;
                Ok::<_, Rejection>(warp::reply::json(&SubmissionResponse { result: stored.result }))
            })
    }

    /// Recent history, or the filtered global history when any filter is set.
    fn history_list(&self) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
        warp::path!("history")
            .and(warp::get())
            .and(self.authenticated())
            .and(warp::query::<Params>())
            .and(self.with_history())
            .and_then(|_session: Session, params: Params, history: Arc<HistoryEngine>| async move {
                let records = blocking(move || list_view(&history, &params)).await?;
                Ok::<_, Rejection>(warp::reply::json(&ApiResponse::success(
                    format!("{} observations", records.len()),
                    to_value(&records),
                )))
            })
    }

    fn search(&self) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
        warp::path!("search")
            .and(warp::get())
            .and(self.authenticated())
            .and(warp::query::<Params>())
            .and(self.with_history())
            .and_then(|_session: Session, params: Params, history: Arc<HistoryEngine>| async move {
                let records = blocking(move || {
                    history.search(
                        params.get("name").map(String::as_str).unwrap_or(""),
                        params.get("start_date").map(String::as_str),
                        params.get("end_date").map(String::as_str),
                    )
                })
                .await?;
                Ok::<_, Rejection>(warp::reply::json(&ApiResponse::success(
                    format!("{} observations", records.len()),
                    to_value(&records),
                )))
            })
    }

    fn chart_data(&self) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
        warp::path!("chartdata")
            .and(warp::get())
            .and(self.authenticated())
            .and(self.with_history())
            .and_then(|_session: Session, history: Arc<HistoryEngine>| async move {
                let recent = blocking(move || history.recent()).await?;
                Ok::<_, Rejection>(warp::reply::json(&ChartSeries::chronological(&recent)))
            })
    }

    fn export_csv(&self) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
        warp::path!("export" / "csv")
            .and(warp::get())
            .and(self.authenticated())
            .and(warp::query::<Params>())
            .and(self.with_history())
            .and_then(|_session: Session, params: Params, history: Arc<HistoryEngine>| async move {
                let document = blocking(move || list_document(&history, &params, &CsvSink)).await?;
                Ok::<_, Rejection>(attachment(document, &file_name("patient_history", &CsvSink)))
            })
    }

    fn export_pdf(&self) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
        warp::path!("export" / "pdf")
            .and(warp::get())
            .and(self.authenticated())
            .and(warp::query::<Params>())
            .and(self.with_history())
            .and_then(|_session: Session, params: Params, history: Arc<HistoryEngine>| async move {
                let document = blocking(move || list_document(&history, &params, &PdfSink)).await?;
                Ok::<_, Rejection>(attachment(document, &file_name("patient_report", &PdfSink)))
            })
    }

    /// The anchor observation plus its patient's filtered history.
    fn patient_profile(&self) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
        warp::path!("patient" / i64)
            .and(warp::get())
            .and(self.authenticated())
            .and(warp::query::<Params>())
            .and(self.with_history())
            .and_then(|id: i64, _session: Session, params: Params, history: Arc<HistoryEngine>| async move {
                let options = filter_options(&params);
                let profile = blocking(move || {
                    history.patient_history(id, &options, SortOrder::Descending)
                })
                .await?;
                Ok::<_, Rejection>(warp::reply::json(&ApiResponse::success(
                    format!("{} observations", profile.records.len()),
                    to_value(&ProfileBody { patient: &profile.patient, records: &profile.records }),
                )))
            })
    }

    fn patient_chart_data(&self) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
        warp::path!("patient" / "chartdata" / i64)
            .and(warp::get())
            .and(self.authenticated())
            .and(self.with_history())
            .and_then(|id: i64, _session: Session, history: Arc<HistoryEngine>| async move {
                let profile = blocking(move || history.patient_records(id, SortOrder::Ascending)).await?;
                Ok::<_, Rejection>(warp::reply::json(&ChartSeries::from_observations(&profile.records)))
            })
    }

    fn patient_export_pdf(&self) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
        warp::path!("patient" / "export" / "pdf" / i64)
            .and(warp::get())
            .and(self.authenticated())
            .and(self.with_history())
            .and_then(|id: i64, _session: Session, history: Arc<HistoryEngine>| async move {
                let (name, document) = blocking(move || -> Result<_, ApiError> {
                    let profile = history.patient_records(id, SortOrder::Descending)?;
                    let table = report::profile_table(&profile.records);
                    let details = report::profile_details(&profile.patient);
                    let document = PdfSink.render(PROFILE_REPORT_TITLE, &details, &table)?;
                    Ok((profile.patient.patient_name, document))
                })
                .await?;
                let stem = format!("{}_profile", safe_file_stem(&name));
                Ok::<_, Rejection>(attachment(document, &file_name(&stem, &PdfSink)))
            })
    }
}

#[derive(Serialize)]
struct ProfileBody<'a> {
    patient: &'a Observation,
    records: &'a [Observation],
}

fn list_view(history: &HistoryEngine, params: &Params) -> Result<Vec<Observation>, ApiError> {
    let options = filter_options(params);
    let records = if options.is_active() {
        history.history(&options, SortOrder::Descending)?
    } else {
        history.recent()?
    };
    Ok(records)
}

fn list_document(
    history: &HistoryEngine,
    params: &Params,
    sink: &dyn DocumentSink,
) -> Result<Document, ApiError> {
    let records = list_view(history, params)?;
    let table = report::list_table(&records);
    tracing::debug!(rows = table.len(), content_type = sink.content_type(), "rendering export");
    Ok(sink.render(LIST_REPORT_TITLE, &[], &table)?)
}

/// Run store, hashing and rendering work off the async executor.
async fn blocking<T, E, F>(work: F) -> Result<T, Rejection>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<ApiError> + Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result.map_err(reject),
        Err(e) => {
            tracing::error!(error = %e, "blocking task failed");
            Err(reject(ApiError::Internal(e.to_string())))
        }
    }
}

fn file_name(stem: &str, sink: &dyn DocumentSink) -> String {
    format!("{stem}.{}", sink.extension())
}

fn to_value<T: Serialize>(value: &T) -> Option<serde_json::Value> {
    match serde_json::to_value(value) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize response data");
            None
        }
    }
}

fn json_status(status: StatusCode, body: ApiResponse) -> warp::reply::WithStatus<warp::reply::Json> {
    warp::reply::with_status(warp::reply::json(&body), status)
}

fn attachment(document: Document, file_name: &str) -> Response<Vec<u8>> {
    let mut response = Response::new(document.bytes);
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static(document.content_type));
    if let Ok(value) = header::HeaderValue::from_str(&format!("attachment; filename={file_name}")) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    response
}

/// Patient names are free text; keep only characters safe in a header
/// filename.
fn safe_file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect();
    if stem.is_empty() {
        "patient".to_string()
    } else {
        stem
    }
}
